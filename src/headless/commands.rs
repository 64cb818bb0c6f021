//! Line commands accepted on stdin in headless mode
//!
//! ```text
//! start <id>              stop <id>             stop-all
//! order <id> [<id>...]    delete <id>           rename <id> <name...>
//! auto-connect on|off     theme <name>          settings <id> <json>
//! wireless <id>           disconnect <id>       refresh
//! list                    save-path             quit
//! ```

use sfleet_app::EngineHandle;
use sfleet_core::prelude::*;
use sfleet_core::DeviceSettings;

use super::HeadlessEvent;

/// A parsed stdin command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start(String),
    Stop(String),
    StopAll,
    Order(Vec<String>),
    Delete(String),
    Rename { id: String, name: String },
    AutoConnect(bool),
    Theme(String),
    Settings { id: String, settings: DeviceSettings },
    Wireless(String),
    Disconnect(String),
    Refresh,
    List,
    SavePath,
    Quit,
}

/// Parse one input line. `Ok(None)` for blank lines.
pub fn parse_command(line: &str) -> std::result::Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb {
        "start" => Command::Start(single_id(verb, rest)?),
        "stop" => Command::Stop(single_id(verb, rest)?),
        "stop-all" => Command::StopAll,
        "order" => {
            let ids: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
            if ids.is_empty() {
                return Err("order: expected at least one device id".to_string());
            }
            Command::Order(ids)
        }
        "delete" => Command::Delete(single_id(verb, rest)?),
        "rename" => {
            let (id, name) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "rename: expected <id> <name>".to_string())?;
            Command::Rename {
                id: id.to_string(),
                name: name.trim().to_string(),
            }
        }
        "auto-connect" => match rest {
            "on" | "true" => Command::AutoConnect(true),
            "off" | "false" => Command::AutoConnect(false),
            _ => return Err("auto-connect: expected on|off".to_string()),
        },
        "theme" if !rest.is_empty() => Command::Theme(rest.to_string()),
        "theme" => return Err("theme: expected a theme name".to_string()),
        "settings" => {
            let (id, json) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "settings: expected <id> <json>".to_string())?;
            let settings: DeviceSettings = serde_json::from_str(json.trim())
                .map_err(|e| format!("settings: invalid JSON: {}", e))?;
            Command::Settings {
                id: id.to_string(),
                settings,
            }
        }
        "wireless" => Command::Wireless(single_id(verb, rest)?),
        "disconnect" => Command::Disconnect(single_id(verb, rest)?),
        "refresh" => Command::Refresh,
        "list" => Command::List,
        "save-path" => Command::SavePath,
        "q" | "quit" => Command::Quit,
        _ => return Err(format!("unknown command: {}", verb)),
    };

    Ok(Some(command))
}

fn single_id(verb: &str, rest: &str) -> std::result::Result<String, String> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(id), None) => Ok(id.to_string()),
        _ => Err(format!("{}: expected exactly one device id", verb)),
    }
}

impl Command {
    /// Forward to the engine. Queries answer directly on stdout.
    pub async fn dispatch(self, handle: &EngineHandle) -> Result<()> {
        match self {
            Command::Start(id) => handle.start_mirroring(id).await,
            Command::Stop(id) => handle.stop_mirroring(id).await,
            Command::StopAll => handle.stop_all().await,
            Command::Order(ids) => handle.update_device_order(ids).await,
            Command::Delete(id) => handle.delete_device(id).await,
            Command::Rename { id, name } => handle.rename_device(id, name).await,
            Command::AutoConnect(enabled) => handle.set_global_auto_connect(enabled).await,
            Command::Theme(theme) => handle.set_theme(theme).await,
            Command::Settings { id, settings } => handle.update_settings(id, settings).await,
            Command::Wireless(id) => handle.connect_wireless(id).await,
            Command::Disconnect(id) => handle.disconnect_wireless(id).await,
            Command::Refresh => handle.refresh().await,
            Command::List => {
                HeadlessEvent::devices(&handle.devices()).emit();
                Ok(())
            }
            Command::SavePath => {
                let path = handle.select_save_path().await?;
                HeadlessEvent::save_path(path.map(|p| p.to_string_lossy().to_string())).emit();
                Ok(())
            }
            Command::Quit => handle.shutdown().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("  "), Ok(None));
        assert_eq!(parse_command("refresh"), Ok(Some(Command::Refresh)));
        assert_eq!(parse_command("stop-all"), Ok(Some(Command::StopAll)));
        assert_eq!(parse_command("q"), Ok(Some(Command::Quit)));
        assert_eq!(
            parse_command("start dev-1"),
            Ok(Some(Command::Start("dev-1".to_string())))
        );
        assert_eq!(
            parse_command("auto-connect off"),
            Ok(Some(Command::AutoConnect(false)))
        );
    }

    #[test]
    fn test_parse_order_and_rename() {
        assert_eq!(
            parse_command("order dev-2  dev-1"),
            Ok(Some(Command::Order(vec![
                "dev-2".to_string(),
                "dev-1".to_string()
            ])))
        );
        assert_eq!(
            parse_command("rename dev-1 Desk Phone"),
            Ok(Some(Command::Rename {
                id: "dev-1".to_string(),
                name: "Desk Phone".to_string(),
            }))
        );
    }

    #[test]
    fn test_parse_settings_json() {
        let line = r#"settings dev-1 {"autoConnect":false,"usbProfile":{"maxFps":30}}"#;
        let command = parse_command(line).unwrap().unwrap();
        match command {
            Command::Settings { id, settings } => {
                assert_eq!(id, "dev-1");
                assert!(!settings.auto_connect);
                assert_eq!(settings.cable_profile.max_fps, 30);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("start").is_err());
        assert!(parse_command("start a b").is_err());
        assert!(parse_command("order").is_err());
        assert!(parse_command("auto-connect maybe").is_err());
        assert!(parse_command("settings dev-1 {not json").is_err());
        assert!(parse_command("theme").is_err());
        assert_eq!(
            parse_command("reload"),
            Err("unknown command: reload".to_string())
        );
    }
}
