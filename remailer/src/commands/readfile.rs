use std::{fmt::Write as _, sync::Arc};

use anyhow::Context as _;
use remailer_common::Mail;
use remailer_pipeline::TransformerChain;
use remailer_spool::{Scanner, SpoolError, Tracker};

use crate::config::Config;

/// Run the transformer chain over every unit in the spool and print what it
/// produced.
///
/// Claims go to a process-local tracker, so units handed out here stay
/// available to a running server.
pub async fn readfile(config: &Config) -> anyhow::Result<()> {
    let Some(in_path) = &config.read_file.in_path else {
        anyhow::bail!("read-file.in-path is not configured");
    };

    let scanner = Scanner::new(in_path, Arc::new(Tracker::memory()))
        .with_context(|| format!("invalid spool directory {}", in_path.display()))?;
    let chain = TransformerChain::from_config(&config.transformer_configs())?;

    match scanner.refresh_list().await {
        Ok(_) => {}
        Err(SpoolError::NoFilesFound) => {
            println!("no files found in {}", scanner.in_path().display());
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    }

    loop {
        let mut unit = match scanner.read_next_file().await {
            Ok(unit) => unit,
            Err(SpoolError::Exhausted) => break,
            Err(err) if err.is_skip() => {
                println!("{err}");
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        match chain.run(&mut unit).await {
            Ok(mail) => print!("{}", describe(&mail)),
            Err(err) => println!("{}: {err}", unit.id),
        }
    }

    Ok(())
}

/// A human readable summary of a parsed mail.
pub fn describe(mail: &Mail) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}:", mail.id);
    let _ = writeln!(
        out,
        "  from:         {}",
        mail.from.as_ref().map(|from| from.header_value()).unwrap_or_default()
    );
    let _ = writeln!(out, "  to:           {}", mail.to.header_value());
    let _ = writeln!(out, "  subject:      {}", String::from_utf8_lossy(&mail.subject));
    let _ = writeln!(
        out,
        "  content-type: {}",
        String::from_utf8_lossy(&mail.content_type)
    );
    let _ = writeln!(
        out,
        "  message-id:   {}",
        String::from_utf8_lossy(&mail.message_id_header())
    );

    let mut keys: Vec<&String> = mail.metadata.keys().collect();
    keys.sort();
    let _ = writeln!(out, "  headers:      {}", keys.len());
    for key in keys {
        let _ = writeln!(
            out,
            "    {key}: {}",
            String::from_utf8_lossy(&mail.metadata[key])
        );
    }

    let _ = writeln!(out, "  body:         {} bytes", mail.body.len());
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use remailer_common::{Address, AddressList};

    use super::*;

    #[test]
    fn describes_the_parsed_fields() {
        let mut mail = Mail::new("0009");
        mail.from = Some(Address::parse("sender@example.com").unwrap());
        mail.to = AddressList::parse("a@example.org, b@example.org").unwrap();
        mail.subject = b"Hello".to_vec();
        mail.message_id = b"<id@example.com>".to_vec();
        mail.metadata.insert("Subject".to_string(), b"Hello".to_vec());
        mail.body = b"body".to_vec();

        let text = describe(&mail);
        assert!(text.starts_with("0009:\n"));
        assert!(text.contains("  to:           a@example.org, b@example.org\n"));
        assert!(text.contains("  message-id:   <id@example.com>\n"));
        assert!(text.contains("    Subject: Hello\n"));
        assert!(text.contains("  body:         4 bytes\n"));
    }
}
