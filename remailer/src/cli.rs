use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Deliver mail from a sendmail style spool directory.
#[derive(Debug, Parser)]
#[command(name = "remailer", version, about)]
pub struct Cli {
    /// Log at DEBUG level
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Configuration file [default: $REM_CONFIG, then $HOME/config.yaml]
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Watch the spool directory and deliver everything in it
    Server,

    /// Send a single message
    Sendmail(SendmailArgs),

    /// Print the MX hosts for a domain
    Lookupmx {
        domain: String,
    },

    /// Parse every spool unit and print the resulting mail
    Readfile,

    /// Generate a DKIM key pair and the matching TXT record
    Gendkim(GendkimArgs),
}

#[derive(Debug, Args)]
pub struct SendmailArgs {
    /// Recipient address; repeat for several
    #[arg(long, required = true, num_args = 1..)]
    pub to: Vec<String>,

    /// Sender address [default: read-file.default-from]
    #[arg(long)]
    pub from: Option<String>,

    #[arg(long, default_value = "")]
    pub subject: String,

    /// Message body
    #[arg(long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// Read the message body from a file
    #[arg(long, value_name = "PATH")]
    pub body_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct GendkimArgs {
    /// rsa or ed25519
    #[arg(long, default_value = "rsa")]
    pub algorithm: String,

    /// RSA modulus size
    #[arg(long, default_value_t = 2048)]
    pub bit_size: usize,

    /// Domain the key signs for
    #[arg(long)]
    pub dkim_domain: String,

    #[arg(long, default_value = "sha256")]
    pub hash: String,

    /// Directory the key files are written to
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub out_path: PathBuf,

    #[arg(long, default_value = "default")]
    pub selector: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sendmail_flags() {
        let cli = Cli::try_parse_from([
            "remailer",
            "-d",
            "sendmail",
            "--to",
            "a@example.com",
            "b@example.com",
            "--subject",
            "hi",
            "--body",
            "hello",
        ])
        .unwrap();

        assert!(cli.debug);
        let Command::Sendmail(args) = cli.command else {
            panic!("expected sendmail");
        };
        assert_eq!(args.to, vec!["a@example.com", "b@example.com"]);
        assert_eq!(args.body.as_deref(), Some("hello"));
    }

    #[test]
    fn body_and_body_file_conflict() {
        assert!(
            Cli::try_parse_from([
                "remailer", "sendmail", "--to", "a@example.com", "--body", "x", "--body-file",
                "/tmp/body",
            ])
            .is_err()
        );
    }

    #[test]
    fn gendkim_defaults() {
        let cli = Cli::try_parse_from(["remailer", "gendkim", "--dkim-domain", "example.com"])
            .unwrap();
        let Command::Gendkim(args) = cli.command else {
            panic!("expected gendkim");
        };

        assert_eq!(args.bit_size, 2048);
        assert_eq!(args.hash, "sha256");
        assert_eq!(args.selector, "default");
        assert_eq!(args.out_path, PathBuf::from("."));
    }

    #[test]
    fn lookupmx_takes_a_domain() {
        let cli = Cli::try_parse_from(["remailer", "lookupmx", "example.com", "-c", "/etc/x.yaml"])
            .unwrap();
        assert!(matches!(cli.command, Command::Lookupmx { ref domain } if domain == "example.com"));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/x.yaml")));
    }
}
