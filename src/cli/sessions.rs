//! Sessions CLI command handlers.

use std::path::Path;

use anyhow::{bail, Result};

use super::common::{load_config, session_delegator};
use super::SessionsAction;

pub(crate) async fn cmd_sessions(config_path: Option<&Path>, action: SessionsAction) -> Result<()> {
    let config = load_config(config_path)?;
    match action {
        SessionsAction::List { home } => {
            let sessions = session_delegator(&config, home.as_deref());
            let names = sessions.list_sessions().await?;
            if names.is_empty() {
                println!("No sessions in {}", sessions.sessions_home().display());
            }
            for name in names {
                println!("{}", name);
            }
        }
        SessionsAction::Info { home } => {
            let sessions = session_delegator(&config, home.as_deref());
            let info = sessions.info().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        SessionsAction::Delete { name, home } => {
            let sessions = session_delegator(&config, home.as_deref());
            if !sessions.delete(&name).await? {
                bail!("Session not found: {}", name);
            }
            println!("Deleted session '{}'", name);
        }
    }
    Ok(())
}
