//! Console command grammar
//!
//! Each input line is split into words by [`split_line`] and parsed by clap
//! in multicall mode, so the first word names the command.

use crate::types::PayloadType;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// One parsed console line
#[derive(Debug, Parser)]
#[command(multicall = true)]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum Command {
    /// List received topics
    Ls {
        /// List topics synthesised by the client instead
        #[arg(long)]
        cli: bool,
    },

    /// Connect to a device, clearing all topics
    Serial {
        /// Port (`sim`, `sim:<profile>`, `tcp://host:port`). Defaults to the last one used
        port: Option<String>,

        /// Link speed. Defaults to the last one used
        #[arg(short = 'b', long = "bauds")]
        bauds: Option<u32>,
    },

    /// Close the link
    Disconnect,

    /// Print the most recent samples of a topic
    Print {
        topic: String,

        /// Number of samples, 0 for the whole history
        #[arg(short, long, default_value_t = 1)]
        limit: usize,
    },

    /// Number of samples received on a topic
    Count { topic: String },

    /// Publish a value on a topic
    Pub {
        topic: String,

        #[arg(allow_negative_numbers = true)]
        value: String,

        /// Wire type. Inferred from the value when omitted
        #[arg(short = 't', long = "type", value_parser = parse_payload_type)]
        payload_type: Option<PayloadType>,
    },

    /// Open a live plot of a topic
    Plot { topic: String },

    /// Write a topic's history to a CSV file
    Dump { topic: String, file: PathBuf },

    /// Link, speed and decoder counters
    Stats,

    /// Session overview
    Info,

    /// Close plots and leave
    #[command(alias = "exit")]
    Quit,
}

fn parse_payload_type(s: &str) -> Result<PayloadType, String> {
    s.parse::<PayloadType>().map_err(|e| e.to_string())
}

/// Split a console line into words.
///
/// Words are separated by whitespace. Double quotes group words and are
/// removed; inside quotes a backslash escapes the next character.
pub fn split_line(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            '\\' if quoted => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quoted {
        return Err("unterminated quote".to_string());
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Command, clap::Error> {
        CommandLine::try_parse_from(split_line(line).unwrap()).map(|l| l.command)
    }

    #[test]
    fn test_split_line() {
        assert_eq!(split_line("  ls   --cli ").unwrap(), vec!["ls", "--cli"]);
        assert_eq!(
            split_line(r#"pub msg "hello world" --type string"#).unwrap(),
            vec!["pub", "msg", "hello world", "--type", "string"]
        );
        assert_eq!(
            split_line(r#"pub msg "say \"hi\"""#).unwrap(),
            vec!["pub", "msg", "say \"hi\""]
        );
        assert_eq!(split_line(r#"pub msg """#).unwrap(), vec!["pub", "msg", ""]);
        assert!(split_line(r#"pub msg "oops"#).is_err());
        assert!(split_line("   ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("ls").unwrap(), Command::Ls { cli: false });
        assert_eq!(parse("ls --cli").unwrap(), Command::Ls { cli: true });
        assert_eq!(
            parse("serial tcp://127.0.0.1:5000 -b 115200").unwrap(),
            Command::Serial {
                port: Some("tcp://127.0.0.1:5000".to_string()),
                bauds: Some(115200)
            }
        );
        assert_eq!(
            parse("serial").unwrap(),
            Command::Serial {
                port: None,
                bauds: None
            }
        );
        assert_eq!(
            parse("print sine -l 0").unwrap(),
            Command::Print {
                topic: "sine".to_string(),
                limit: 0
            }
        );
        assert_eq!(
            parse("print sine").unwrap(),
            Command::Print {
                topic: "sine".to_string(),
                limit: 1
            }
        );
        assert_eq!(parse("exit").unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_pub_types() {
        assert_eq!(
            parse("pub gain 12 --type uint8").unwrap(),
            Command::Pub {
                topic: "gain".to_string(),
                value: "12".to_string(),
                payload_type: Some(PayloadType::Uint8)
            }
        );
        assert_eq!(
            parse("pub offset -3").unwrap(),
            Command::Pub {
                topic: "offset".to_string(),
                value: "-3".to_string(),
                payload_type: None
            }
        );
        assert!(parse("pub gain 12 --type int64").is_err());
        assert!(parse("pub gain").is_err());
    }

    #[test]
    fn test_unknown_command_and_help() {
        assert!(parse("frobnicate").is_err());
        assert_eq!(
            parse("help").unwrap_err().kind(),
            clap::error::ErrorKind::DisplayHelp
        );
    }
}
