use admin_ipc::{send_request, AdminRequest, AdminResponse, DEFAULT_SOCKET_PATH};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "ADMIN_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    socket: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show run id, gate state and the last sync pass.
    Status,
    /// Stop scheduled and requested sync passes.
    Pause,
    Resume,
    /// Start a sync pass now.
    Sync,
}

impl Command {
    fn request(&self) -> AdminRequest {
        match self {
            Command::Status => AdminRequest::Status,
            Command::Pause => AdminRequest::Pause,
            Command::Resume => AdminRequest::Resume,
            Command::Sync => AdminRequest::SyncNow,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let resp = send_request(&cli.socket, &cli.command.request()).await?;
    println!("{}", serde_json::to_string(&resp)?);
    if let AdminResponse::Error(message) = resp {
        bail!("tpsyncd refused request: {message}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_subcommand_maps_to_sync_now() {
        let cli = Cli::parse_from(["tpctl", "--socket", "/tmp/x.sock", "sync"]);
        assert_eq!(cli.socket, "/tmp/x.sock");
        assert_eq!(cli.command.request(), AdminRequest::SyncNow);
    }
}
