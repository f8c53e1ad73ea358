//! SSH Chain Supervision
//!
//! Builds the `ssh` invocation for a tunnel description and supervises
//! the child process. All hops but the last become a `-J` jump list; the
//! forwards become `-L` arguments, so the ssh client carries the actual
//! relaying and mole only watches the process.

use crate::config::TunnelConfig;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Build the argument vector for the ssh invocation.
///
/// `-N -T` because the chain exists only for its forwards;
/// `ExitOnForwardFailure` so a dead forward kills the process instead of
/// leaving a half-working tunnel; a 30s server-alive probe to detect
/// silent drops.
///
/// A description without hops is a valid tunnel but has no ssh chain to
/// build; that is [`SshError::NoHops`], and the caller relays directly
/// instead.
pub fn ssh_args(config: &TunnelConfig) -> Result<Vec<String>, SshError> {
    let mut args = vec![
        "-N".to_string(),
        "-T".to_string(),
        "-o".to_string(),
        "ExitOnForwardFailure=yes".to_string(),
        "-o".to_string(),
        "ServerAliveInterval=30".to_string(),
    ];

    let (last, jumps) = config.hops.split_last().ok_or(SshError::NoHops)?;

    if !jumps.is_empty() {
        let jump_list = jumps
            .iter()
            .map(|hop| hop.jump_spec())
            .collect::<Vec<_>>()
            .join(",");
        args.push("-J".to_string());
        args.push(jump_list);
    }

    for hop in &config.hops {
        if let Some(identity) = &hop.identity {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
    }

    for forward in &config.forwards {
        args.push("-L".to_string());
        args.push(format!(
            "{}:{}:{}:{}",
            forward.local.ip(),
            forward.local.port(),
            forward.remote_host,
            forward.remote_port
        ));
    }

    args.push("-p".to_string());
    args.push(last.port.to_string());
    args.push(last.destination());

    Ok(args)
}

/// A supervised ssh child process.
pub struct SshProcess {
    child: Child,
}

impl SshProcess {
    /// Spawn the ssh chain for `config`.
    pub fn spawn(config: &TunnelConfig) -> Result<Self, SshError> {
        let args = ssh_args(config)?;
        debug!("spawning ssh {}", args.join(" "));

        let child = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SshError::Spawn(e.to_string()))?;

        info!("ssh chain started for tunnel {}", config.name);
        Ok(Self { child })
    }

    /// Has the process exited? Non-blocking.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait for the process to exit, returning its status code.
    pub async fn wait(&mut self) -> Result<Option<i32>, SshError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| SshError::Wait(e.to_string()))?;
        Ok(status.code())
    }

    /// Terminate the process.
    pub async fn terminate(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!("failed to kill ssh process: {}", e);
        }
    }
}

/// SSH supervision errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum SshError {
    #[error("tunnel has no ssh hops")]
    NoHops,

    #[error("cannot spawn ssh: {0}")]
    Spawn(String),

    #[error("cannot wait for ssh: {0}")]
    Wait(String),

    #[error("ssh exited with status {0}")]
    Exited(i32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TunnelConfig;

    fn chain() -> TunnelConfig {
        TunnelConfig::from_str(
            r#"
            name = "staging-db"

            [[hops]]
            host = "bastion.example.com"
            user = "jb"

            [[hops]]
            host = "edge.internal"
            port = 2200
            user = "ops"

            [[hops]]
            host = "10.0.12.7"
            port = 2222

            [[forwards]]
            local = "127.0.0.1:5432"
            remote_host = "db.internal"
            remote_port = 5432

            [[forwards]]
            local = "127.0.0.1:6379"
            remote_host = "cache.internal"
            remote_port = 6379
        "#,
        )
        .unwrap()
    }

    #[test]
    fn test_jump_list_excludes_final_hop() {
        let args = ssh_args(&chain()).unwrap();
        let jump_pos = args.iter().position(|a| a == "-J").unwrap();

        assert_eq!(
            args[jump_pos + 1],
            "jb@bastion.example.com:22,ops@edge.internal:2200"
        );
        assert_eq!(args.last().unwrap(), "10.0.12.7");
    }

    #[test]
    fn test_forward_arguments() {
        let args = ssh_args(&chain()).unwrap();

        assert!(args.contains(&"127.0.0.1:5432:db.internal:5432".to_string()));
        assert!(args.contains(&"127.0.0.1:6379:cache.internal:6379".to_string()));
    }

    #[test]
    fn test_final_hop_port() {
        let args = ssh_args(&chain()).unwrap();
        let p_pos = args.iter().position(|a| a == "-p").unwrap();

        assert_eq!(args[p_pos + 1], "2222");
    }

    #[test]
    fn test_single_hop_has_no_jump_list() {
        let config = TunnelConfig::from_str(
            r#"
            name = "one-hop"

            [[hops]]
            host = "bastion.example.com"
            user = "jb"

            [[forwards]]
            local = "127.0.0.1:8080"
            remote_host = "web.internal"
            remote_port = 80
        "#,
        )
        .unwrap();

        let args = ssh_args(&config).unwrap();
        assert!(!args.contains(&"-J".to_string()));
        assert_eq!(args.last().unwrap(), "jb@bastion.example.com");
    }

    #[test]
    fn test_forward_failure_is_fatal_to_the_chain() {
        let args = ssh_args(&chain()).unwrap();
        assert!(args.contains(&"ExitOnForwardFailure=yes".to_string()));
    }

    #[test]
    fn test_hopless_description_has_no_chain() {
        // Hopless tunnels are valid descriptions; they just have nothing
        // for ssh to do, and the caller must not get an unwind for asking.
        let config = TunnelConfig::from_str(
            r#"
            name = "direct"

            [[forwards]]
            local = "127.0.0.1:8080"
            remote_host = "10.8.0.1"
            remote_port = 80
        "#,
        )
        .unwrap();

        assert!(matches!(ssh_args(&config), Err(SshError::NoHops)));
        assert!(matches!(
            SshProcess::spawn(&config),
            Err(SshError::NoHops)
        ));
    }
}
