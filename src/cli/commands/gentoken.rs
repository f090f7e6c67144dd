use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::Args;
use serde_json::json;

use crate::auth::{issue_token, Claims, ROLE_USER};
use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config;
use crate::keystore::KeyStore;

#[derive(Args, Debug)]
pub struct GentokenArgs {
    #[arg(long, help = "Key folder (defaults to AUTH_KEYS_FOLDER)")]
    pub folder: Option<PathBuf>,

    #[arg(long, help = "Key id to sign with (defaults to AUTH_ACTIVE_KID)")]
    pub kid: Option<String>,

    #[arg(long, help = "Token subject (user id)")]
    pub subject: String,

    #[arg(long = "role", help = "Role to grant; repeat for several (defaults to USER)")]
    pub roles: Vec<String>,

    #[arg(long, help = "Issuer (defaults to AUTH_ISSUER)")]
    pub issuer: Option<String>,

    #[arg(long, help = "Lifetime in hours (defaults to AUTH_TOKEN_TTL_HOURS)")]
    pub ttl_hours: Option<u64>,
}

pub fn handle(args: GentokenArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let auth = &config::config().auth;
    let folder = args.folder.clone().unwrap_or_else(|| PathBuf::from(&auth.keys_folder));
    let kid = args.kid.clone().unwrap_or_else(|| auth.active_kid.clone());

    let keys = KeyStore::load(&folder)
        .with_context(|| format!("loading keys from {}", folder.display()))?;
    let claims = build_claims(&args, &auth.issuer, auth.token_ttl_hours)?;
    let token = issue_token(&keys, &kid, &claims)?;

    output_success(
        &output_format,
        &format!("Signed token for {} with key {}", claims.subject, kid),
        json!({
            "kid": kid,
            "token": token,
            "claims": claims,
        }),
        Some(&token),
    )
}

fn build_claims(
    args: &GentokenArgs,
    default_issuer: &str,
    default_ttl_hours: u64,
) -> anyhow::Result<Claims> {
    let roles = if args.roles.is_empty() {
        vec![ROLE_USER.to_string()]
    } else {
        args.roles.iter().map(|r| r.to_uppercase()).collect()
    };
    let issuer = args.issuer.clone().unwrap_or_else(|| default_issuer.to_string());
    let ttl_hours = args.ttl_hours.unwrap_or(default_ttl_hours);
    let ttl = i64::try_from(ttl_hours)
        .ok()
        .and_then(chrono::Duration::try_hours)
        .filter(|ttl| Utc::now().checked_add_signed(*ttl).is_some())
        .with_context(|| format!("token lifetime of {ttl_hours} hours is out of range"))?;

    Ok(Claims::new(args.subject.clone(), issuer, roles, ttl))
}
