use remailer_common::Mail;
use remailer_dkim::{DkimSigner, SelectorConfig};
use serde::Deserialize;
use serde_yaml::Value;

use super::Processor;
use crate::{
    Result,
    stage::{Stage, parse_args},
};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct DkimArgs {
    selectors: Vec<SelectorConfig>,
    catchall_separator: Option<String>,
}

/// Adds a `DKIM-Signature` for every selector of the sender's domain.
///
/// Keys are loaded once in `init`; a bad key fails the whole chain.
#[derive(Debug, Default)]
pub struct Dkim {
    signer: Option<DkimSigner>,
}

impl Dkim {
    pub const NAME: &'static str = "dkim";

    pub const fn new(signer: DkimSigner) -> Self {
        Self {
            signer: Some(signer),
        }
    }
}

impl Stage for Dkim {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self, args: &Value) -> Result<()> {
        let args: DkimArgs = parse_args(Self::NAME, args)?;

        let mut signer = DkimSigner::new(args.selectors)?;
        if let Some(separator) = args.catchall_separator {
            signer = signer.with_catchall_separator(separator);
        }

        self.signer = Some(signer);
        Ok(())
    }
}

impl Processor for Dkim {
    fn process(&self, mail: &mut Mail) -> Result<()> {
        let Some(signer) = &self.signer else {
            return Ok(());
        };

        let signed = signer.sign(mail)?;
        tracing::debug!(unit = %mail.id, signatures = signed, "DKIM signed");
        Ok(())
    }
}
