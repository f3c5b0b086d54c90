//! `tunefetch stop` – ask the running session to stop an item (or everything).

use anyhow::Result;
use tunefetch_core::control::default_control_socket_path;

use crate::cli::control_socket::{check_reply, send_command, ControlCommand};

pub async fn run_stop(id: Option<&str>, all: bool) -> Result<()> {
    let command = match id {
        Some(id) if !all => ControlCommand::Stop(id.to_string()),
        _ => ControlCommand::StopAll,
    };
    let socket = default_control_socket_path()?;
    match send_command(&socket, &command).await? {
        Some(reply) => println!("{}.", check_reply(&reply)?),
        None => println!("No running session."),
    }
    Ok(())
}
