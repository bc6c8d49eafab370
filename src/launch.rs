use crate::error::{Error, ErrorKind, Result};
use crate::rest_api::validate_port;
use serde::{Deserialize, Serialize};

pub const MIN_PLAYERS: u32 = 2;
pub const MAX_PLAYERS: u32 = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchOptions {
    pub server_exe: String,
    pub game_port: u16,
    pub public_port: u16,
    pub player_limit: u32,
    /// Extra arguments appended verbatim, split on whitespace.
    #[serde(default)]
    pub extra_args: Option<String>,
}

impl LaunchOptions {
    pub fn validate(&self) -> Result<()> {
        if self.server_exe.trim().is_empty() {
            return Err(Error::new(ErrorKind::InvalidArgument, "server executable is not set"));
        }
        validate_port(self.game_port)?;
        validate_port(self.public_port)?;
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&self.player_limit) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("player limit must be within {MIN_PLAYERS}..={MAX_PLAYERS}"),
            ));
        }
        Ok(())
    }

    pub fn command_line(&self) -> Result<CommandLine> {
        self.validate()?;
        let mut args = vec![
            format!("-port={}", self.game_port),
            format!("-players={}", self.player_limit),
            "-publicip".to_string(),
            "0.0.0.0".to_string(),
            "-publicport".to_string(),
            self.public_port.to_string(),
        ];
        if let Some(extra) = self.extra_args.as_deref() {
            args.extend(extra.split_whitespace().map(str::to_string));
        }
        Ok(CommandLine {
            program: self.server_exe.clone(),
            args,
        })
    }
}
