use std::path::PathBuf;

use axum::http::{header, HeaderMap, HeaderValue};
use clap::{Parser, Subcommand};

use http_kit::config::{load_config, KitConfig};
use http_kit::cookies;
use http_kit::security::{
    is_ip_trusted, resolve_origin, RequestOrigin, X_FORWARDED_HOST, X_FORWARDED_PROTO,
};

#[derive(Parser)]
#[command(name = "http-kit-cli")]
#[command(about = "Offline access to http-kit cookie signing and trust resolution", long_about = None)]
struct Cli {
    /// Configuration file supplying the cookie secret and trust settings.
    #[arg(short, long, env = "HTTP_KIT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign a cookie value
    Sign {
        value: String,
        /// Overrides `cookies.secret` from the config
        #[arg(short, long)]
        secret: Option<String>,
    },
    /// Verify a signed cookie value and print the original
    Unsign {
        token: String,
        #[arg(short, long)]
        secret: Option<String>,
    },
    /// Check whether an address may set forwarding headers
    Trust { ip: String },
    /// Resolve the protocol and hostname a request would see
    Host {
        ip: String,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        forwarded_host: Option<String>,
        #[arg(long)]
        forwarded_proto: Option<String>,
        /// Treat the connection as TLS
        #[arg(long)]
        encrypted: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => KitConfig::default(),
    };

    match cli.command {
        Commands::Sign { value, secret } => {
            let secret = secret.unwrap_or_else(|| config.cookies.secret.clone());
            println!("{}", cookies::sign(&value, &secret)?);
        }
        Commands::Unsign { token, secret } => {
            let secret = secret.unwrap_or_else(|| config.cookies.secret.clone());
            println!("{}", cookies::unsign(Some(&token), &secret)?);
        }
        Commands::Trust { ip } => {
            let trusted = is_ip_trusted(&ip, &config.trust.trusted_ips, &config.trust.untrusted_ips);
            println!("{}", if trusted { "trusted" } else { "untrusted" });
        }
        Commands::Host {
            ip,
            host,
            forwarded_host,
            forwarded_proto,
            encrypted,
        } => {
            let mut headers = HeaderMap::new();
            if let Some(host) = host {
                headers.insert(header::HOST, HeaderValue::from_str(&host)?);
            }
            if let Some(forwarded) = forwarded_host {
                headers.insert(X_FORWARDED_HOST, HeaderValue::from_str(&forwarded)?);
            }
            if let Some(proto) = forwarded_proto {
                headers.insert(X_FORWARDED_PROTO, HeaderValue::from_str(&proto)?);
            }

            let origin = RequestOrigin::new(ip, headers, encrypted);
            let resolved = resolve_origin(&origin, &config.trust)?;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }
    }

    Ok(())
}
