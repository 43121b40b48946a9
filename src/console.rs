//! # Operator Console
//!
//! Line-oriented commands read by the bridge binary.
//!
//! ```text
//! open 1 1          open channel 1 of remote 1
//! close 2 1,3       close channels 1 and 3 of remote 2
//! stop 3 0b000101   stop with a raw channel mask
//! inhibit 300       hold transmissions back for 300 ms
//! resume            lift an inhibit
//! learn | cancel    start or stop learning a physical remote
//! dump              print what has been learned
//! pending           list queued commands
//! quit
//! ```

use std::str::FromStr;

use crate::error::{DirectolorError, Result};
use crate::protocol::types::{BlindAction, ChannelMask};
use crate::scheduler::Scheduler;

pub const HELP: &str = "\
commands:
  <action> <remote> <channels>   actions: open close tilt-open tilt-close stop
                                 favorite set-favorite join remove
                                 channels: 3 | 1,3 | 0b000101
  inhibit <ms> | resume
  learn | cancel | dump
  pending | help | quit";

/// A parsed console line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Send {
        remote: usize,
        mask: u8,
        action: BlindAction,
    },
    Inhibit(u64),
    Resume,
    Learn,
    Cancel,
    Dump,
    Pending,
    Help,
    Quit,
}

fn invalid(message: impl Into<String>) -> DirectolorError {
    DirectolorError::InvalidCommand(message.into())
}

/// Parse a channel argument into a raw mask
///
/// Raw masks are passed through unchecked so the scheduler reports them.
fn parse_channels(arg: &str) -> Result<u8> {
    if let Some(bits) = arg.strip_prefix("0b") {
        return u8::from_str_radix(bits, 2).map_err(|_| invalid(format!("bad mask '{}'", arg)));
    }

    let mut mask: Option<ChannelMask> = None;
    for part in arg.split(',') {
        let channel: u8 = part
            .trim()
            .parse()
            .map_err(|_| invalid(format!("bad channel '{}'", part)))?;
        let single = ChannelMask::from_channel(channel)?;
        mask = Some(mask.map_or(single, |m| m.merge(single)));
    }
    mask.map(ChannelMask::bits)
        .ok_or_else(|| invalid("no channel given"))
}

impl FromStr for OperatorCommand {
    type Err = DirectolorError;

    fn from_str(line: &str) -> Result<Self> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let (&verb, args) = words.split_first().ok_or_else(|| invalid("empty line"))?;

        let command = match (verb.to_ascii_lowercase().as_str(), args) {
            ("inhibit", [ms]) => OperatorCommand::Inhibit(
                ms.parse()
                    .map_err(|_| invalid(format!("bad duration '{}'", ms)))?,
            ),
            ("resume", []) => OperatorCommand::Resume,
            ("learn", []) => OperatorCommand::Learn,
            ("cancel", []) => OperatorCommand::Cancel,
            ("dump", []) => OperatorCommand::Dump,
            ("pending", []) => OperatorCommand::Pending,
            ("help", []) | ("?", []) => OperatorCommand::Help,
            ("quit", []) | ("exit", []) => OperatorCommand::Quit,
            (name, [remote, channels]) => {
                let action: BlindAction = name
                    .parse()
                    .map_err(|_| invalid(format!("unknown command '{}'", verb)))?;
                let remote = remote
                    .parse()
                    .map_err(|_| invalid(format!("bad remote '{}'", remote)))?;
                OperatorCommand::Send {
                    remote,
                    mask: parse_channels(channels)?,
                    action,
                }
            }
            _ => return Err(invalid(format!("cannot parse '{}', try 'help'", line.trim()))),
        };
        Ok(command)
    }
}

impl OperatorCommand {
    /// Carry out the command
    ///
    /// # Returns
    ///
    /// Text to show the operator
    ///
    /// # Errors
    ///
    /// Returns the scheduler's error for rejected submissions
    pub async fn execute(self, scheduler: &Scheduler) -> Result<String> {
        let reply = match self {
            OperatorCommand::Send {
                remote,
                mask,
                action,
            } => {
                scheduler.submit(remote, mask, action).await?;
                format!("queued {} for remote {} mask {:#08b}", action, remote, mask)
            }
            OperatorCommand::Inhibit(ms) => {
                scheduler.inhibit(ms).await;
                if ms == 0 {
                    "resumed".to_string()
                } else {
                    format!("inhibited for up to {} ms", ms)
                }
            }
            OperatorCommand::Resume => {
                scheduler.resume();
                "resumed".to_string()
            }
            OperatorCommand::Learn => {
                scheduler.start_learning()?;
                "learning: press a button on one channel of the remote".to_string()
            }
            OperatorCommand::Cancel => {
                scheduler.stop_learning();
                "learning stopped".to_string()
            }
            OperatorCommand::Dump => scheduler.dump_codes().to_string(),
            OperatorCommand::Pending => {
                let pending = scheduler.pending();
                if pending.is_empty() {
                    "nothing pending".to_string()
                } else {
                    pending
                        .iter()
                        .map(|c| {
                            format!(
                                "remote {} {} channels {} ({} attempts left)",
                                c.key.remote,
                                c.action(),
                                c.mask,
                                c.attempts_remaining
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            OperatorCommand::Help => HELP.to_string(),
            OperatorCommand::Quit => "bye".to_string(),
        };
        Ok(reply)
    }
}
