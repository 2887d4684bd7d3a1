use std::path::PathBuf;

/// Inspect the development outbox
#[derive(clap::Parser)]
#[cfg_attr(test, derive(Debug, PartialEq))]
#[command(about, version)]
pub struct Args {
    /// Path of an outbox settings file (json), instead of ~/.config/mail-viewer/outbox.json
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub enum Commands {
    /// Store a text + HTML test email in the outbox
    SendTest {
        /// Recipient address
        #[arg(short, long, default_value = "to@example.com")]
        to: String,
        /// File to attach
        #[arg(short, long)]
        attachment: Option<PathBuf>,
        /// Number of copies to send
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },
    /// List every stored message, oldest first
    List {
        /// Print the messages as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print one message
    Show {
        /// Message-ID, with or without angle brackets
        message_id: String,
        /// Print the message as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove one message and its attachments
    Delete {
        /// Message-ID, with or without angle brackets
        message_id: String,
    },
    /// Print the settings in effect
    Settings {
        /// Also write them to the settings file
        #[arg(long)]
        save: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn arg_send_test_defaults() {
        assert_eq!(
            Args {
                config: None,
                command: Commands::SendTest {
                    to: "to@example.com".to_string(),
                    attachment: None,
                    count: 1,
                }
            },
            Args::try_parse_from(["", "send-test"]).unwrap()
        );
    }

    #[test]
    fn arg_send_test_options() {
        assert_eq!(
            Args {
                config: Some(PathBuf::from("outbox.json")),
                command: Commands::SendTest {
                    to: "dev@example.com".to_string(),
                    attachment: Some(PathBuf::from("icon.gif")),
                    count: 3,
                }
            },
            Args::try_parse_from([
                "",
                "--config",
                "outbox.json",
                "send-test",
                "--to",
                "dev@example.com",
                "-a",
                "icon.gif",
                "-n",
                "3"
            ])
            .unwrap()
        );
    }

    #[test]
    fn arg_show_and_delete() {
        assert_eq!(
            Args {
                config: None,
                command: Commands::Show {
                    message_id: "abc@localhost".to_string(),
                    json: true,
                }
            },
            Args::try_parse_from(["", "show", "abc@localhost", "--json"]).unwrap()
        );

        assert_eq!(
            Args {
                config: None,
                command: Commands::Delete {
                    message_id: "<abc@localhost>".to_string(),
                }
            },
            Args::try_parse_from(["", "delete", "<abc@localhost>"]).unwrap()
        );
    }

    #[test]
    fn arg_settings() {
        assert_eq!(
            Args {
                config: None,
                command: Commands::Settings { save: false }
            },
            Args::try_parse_from(["", "settings"]).unwrap()
        );
        assert_eq!(
            Args {
                config: Some(PathBuf::from("/tmp/outbox.json")),
                command: Commands::Settings { save: true }
            },
            Args::try_parse_from(["", "-c", "/tmp/outbox.json", "settings", "--save"]).unwrap()
        );
    }

    #[test]
    fn arg_missing_message_id() {
        assert!(Args::try_parse_from(["", "show"]).is_err());
        assert!(Args::try_parse_from(["", "delete"]).is_err());
    }
}
