use remailer_delivery::DnsResolver;

/// Print the MX hosts for `domain` by ascending preference.
pub async fn lookupmx(domain: &str) -> anyhow::Result<()> {
    let resolver = DnsResolver::system()?;
    let record = resolver.lookup_mx(domain).await?;

    println!("domain:   {}", record.domain);
    println!("next hop: {}", record.next_hop);
    for (preference, exchange) in &record.records {
        println!("  {preference:>5} {exchange}");
    }

    Ok(())
}
