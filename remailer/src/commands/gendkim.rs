use std::path::PathBuf;

use remailer_dkim::{
    Algorithm, SelectorConfig, default_headers, generate, txt_record, write_key_pair,
};
use remailer_pipeline::{StageConfig, processor};
use serde::Serialize;

use crate::cli::GendkimArgs;

/// `dkim` signs the merged headers, so it sits right before `mergeBody`.
const DKIM_INDEX: i64 = 4;

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct Snippet {
    mail_processors: Vec<StageConfig>,
}

/// A `mail-processors` section: the canonical chain with a `dkim` stage
/// that signs with `selector`.
pub fn selector_snippet(selector: &SelectorConfig) -> anyhow::Result<String> {
    let mut args = serde_yaml::Mapping::new();
    args.insert(
        "selectors".into(),
        serde_yaml::Value::Sequence(vec![serde_yaml::to_value(selector)?]),
    );

    let mut mail_processors = processor::default_configs();
    for stage in &mut mail_processors {
        if stage.index >= DKIM_INDEX {
            stage.index += 1;
        }
    }
    mail_processors.push(
        StageConfig::new("dkim", DKIM_INDEX).with_args(serde_yaml::Value::Mapping(args)),
    );
    mail_processors.sort_by_key(|stage| stage.index);

    Ok(serde_yaml::to_string(&Snippet { mail_processors })?)
}

/// Generate a key pair, write it to `out_path` and print the TXT record and
/// the processor configuration that uses it.
pub fn gendkim(args: &GendkimArgs) -> anyhow::Result<()> {
    if !args.hash.eq_ignore_ascii_case("sha256") {
        anyhow::bail!("unsupported hash {}, only sha256 is supported", args.hash);
    }

    let Ok(algorithm) = args.algorithm.parse::<Algorithm>();
    let pair = generate(algorithm, args.bit_size)?;
    let (public_path, private_path) = write_key_pair(&args.out_path, &args.dkim_domain, &pair)?;
    let txt = txt_record(&args.dkim_domain, &args.selector, algorithm, &pair.public_pem)?;

    let selector = selector_config(args, private_path.clone());
    println!("{txt}");
    println!();
    println!("public key:  {}", public_path.display());
    println!("private key: {}", private_path.display());
    println!();
    print!("{}", selector_snippet(&selector)?);

    Ok(())
}

fn selector_config(args: &GendkimArgs, private_key_file: PathBuf) -> SelectorConfig {
    let Ok(algorithm) = args.algorithm.parse::<Algorithm>();
    SelectorConfig {
        selector: args.selector.clone(),
        domain: args.dkim_domain.clone(),
        algorithm,
        hash: "sha256".to_string(),
        header_relaxed: true,
        body_relaxed: true,
        headers: default_headers(),
        expiration: None,
        private_key_file,
        seal_headers: false,
    }
}
