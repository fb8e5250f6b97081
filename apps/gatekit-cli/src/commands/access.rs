use super::{parse_instant, Context};

pub async fn cmd_access_check(
    ctx: &Context,
    user: &str,
    path: &str,
    now: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let now = parse_instant(now)?;
    let user = ctx.find_user(user).await?;

    let decision = ctx.gate_for(&user.id).visit(path, now).await?;

    println!("{}", serde_json::to_string_pretty(&decision)?);

    Ok(())
}

pub async fn cmd_access_profile(
    ctx: &Context,
    user: &str,
    now: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let now = parse_instant(now)?;
    let user = ctx.find_user(user).await?;

    let profile = ctx.gate_for(&user.id).profile(now).await?;

    println!("{}", serde_json::to_string_pretty(&profile)?);

    Ok(())
}
