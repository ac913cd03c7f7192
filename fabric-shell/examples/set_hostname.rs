//! Set and read back the hostname of a Fabric Engine switch.
//!
//! The endpoint comes from the environment:
//!
//! ```bash
//! export EXTRM_FE_HOST=192.0.2.10
//! export EXTRM_FE_USERNAME=rwa
//! export EXTRM_FE_PASSWORD=rwa
//! cargo run --example set_hostname -- --hostname LAB-VOSS01
//! ```
//!
//! The host key must be in `~/.ssh/known_hosts` unless `--fingerprint` pins
//! it or `--insecure` is given for a lab device.

use std::env;
use std::time::Duration;

use fabric_shell::session::SessionConfig;
use fabric_shell::transport::{EndpointBuilder, HostKeyPolicy, SshConfig, SshConnector};
use fabric_shell::workflow::{HostnameClient, ReadPolicy};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=debug for session detail
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let endpoint = EndpointBuilder::new().build()?;

    let policy = match (&args.fingerprint, args.insecure) {
        (Some(fingerprint), _) => HostKeyPolicy::Pinned {
            fingerprint: fingerprint.clone(),
        },
        (None, true) => HostKeyPolicy::InsecureAcceptAny,
        (None, false) => HostKeyPolicy::default(),
    };
    let config = SshConfig::default()
        .with_host_key_policy(policy)
        .with_timeout(Duration::from_secs(args.timeout));

    println!("Connecting to {}...", endpoint.socket_addr());

    let client = HostnameClient::new(SshConnector::new(config), endpoint)
        .with_session_config(SessionConfig::default().with_deadline(Duration::from_secs(120)))
        .with_read_policy(ReadPolicy::default().with_max_consecutive_misses(3));

    let state = client.create(&args.hostname).await?;
    println!("Hostname set to {}", state.hostname);

    let state = client.read(&state).await?;
    println!("Device reports SysName {}", state.hostname);

    Ok(())
}

struct Args {
    hostname: String,
    fingerprint: Option<String>,
    insecure: bool,
    timeout: u64,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut hostname = "TEST-FABRIC-ENGINE".to_string();
        let mut fingerprint = None;
        let mut insecure = false;
        let mut timeout = 30u64;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--hostname" | "-n" => {
                    i += 1;
                    if i < args.len() {
                        hostname = args[i].clone();
                    }
                }
                "--fingerprint" | "-f" => {
                    i += 1;
                    if i < args.len() {
                        fingerprint = Some(args[i].clone());
                    }
                }
                "--insecure" => insecure = true,
                "--timeout" | "-t" => {
                    i += 1;
                    if i < args.len() {
                        timeout = args[i].parse().unwrap_or(30);
                    }
                }
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                }
            }
            i += 1;
        }

        Self {
            hostname,
            fingerprint,
            insecure,
            timeout,
        }
    }

    fn print_help() {
        println!(
            r#"fabric-shell set_hostname example

USAGE:
    cargo run --example set_hostname -- [OPTIONS]

ENVIRONMENT:
    EXTRM_FE_HOST            Switch address (required)
    EXTRM_FE_PORT            SSH port [default: 22]
    EXTRM_FE_USERNAME        Username (required)
    EXTRM_FE_PASSWORD        Password (required)

OPTIONS:
    -n, --hostname <NAME>    Hostname to apply [default: TEST-FABRIC-ENGINE]
    -f, --fingerprint <FP>   Pin the host key (SHA256:...)
    --insecure               Accept any host key
    -t, --timeout <SECS>     Connection timeout [default: 30]
    --help                   Print this help message
"#
        );
    }
}
