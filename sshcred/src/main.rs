use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use sshcred_agent::{AgentClient, agent_with_socket, std_agent};
use sshcred_core::config::{Config, default_config_path, resolve_key_path};
use sshcred_core::{SigningIdentity, StderrSink, set_debug};
use sshcred_prompt::{TtyPrompter, UnlockOptions, io_prompt, unlock_signer};

const DEFAULT_NAMESPACE: &str = "file";

fn main() -> Result<()> {
    // Reset SIGPIPE to default so piping output to `head` etc. exits cleanly
    // instead of panicking with "broken pipe".
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (globals, args) = match split_global_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{e}");
            print_help();
            std::process::exit(1);
        }
    };

    init_logging(globals.verbose);

    let cmd = args.first().map(String::as_str).unwrap_or("help");
    if matches!(cmd, "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    let config_path = globals.config.unwrap_or_else(default_config_path);
    let config = Config::load(&config_path)?;
    debug!(path = %config_path.display(), "configuration loaded");

    match cmd {
        "pubkey" => cmd_pubkey(&config, &args[1..]),
        "fingerprint" => cmd_fingerprint(&config, &args[1..]),
        "sign" => cmd_sign(&config, &args[1..]),
        "add" => cmd_add(&config, &args[1..]),
        "list" => cmd_list(&config),
        other => {
            eprintln!("unknown command: {other}");
            print_help();
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        "\
sshcred - SSH private key loader

USAGE:
    sshcred [--config <path>] [--verbose] <command> [args...]

COMMANDS:
    pubkey <key>                        Print the public key in authorized_keys format
    fingerprint <key>                   Print the SHA-256 fingerprint
    sign [--namespace <ns>] <key> <file>
                                        Print an armored SSH signature over <file>
                                        (use - for stdin; namespace defaults to 'file')
                                        (with -, passphrases are read from the terminal)
    add [<key>...]                      Load keys into the running ssh-agent
                                        (no args = [keys] default from the config)
    list                                List identities held by the ssh-agent
    help                                Show this help

FLAGS:
    -c, --config <path>                 Config file
                                        [default: $XDG_CONFIG_HOME/sshcred/config.toml]
    -v, --verbose                       Debug logging on stderr

KEYS:
    A <key> containing '/' is used as a path; a bare name is looked up in
    ~/.ssh.  Encrypted keys prompt for their passphrase on the terminal.

EXAMPLES:
    sshcred pubkey id_ed25519
    sshcred fingerprint ./deploy_key
    sshcred sign --namespace git id_ed25519 commit.txt
    sshcred add id_rsa ~/work/id_ecdsa
    sshcred list"
    );
}

// ---------------------------------------------------------------------------
// Global flags
// ---------------------------------------------------------------------------

#[derive(Debug, Default, PartialEq)]
struct GlobalOpts {
    config: Option<PathBuf>,
    verbose: bool,
}

/// Pull global flags out of `args`, returning them alongside the remaining
/// command and its arguments.  Flags are only recognised before the command.
fn split_global_args(args: &[String]) -> Result<(GlobalOpts, Vec<String>)> {
    let mut opts = GlobalOpts::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--verbose" | "-v" => opts.verbose = true,
            "--config" | "-c" => {
                let Some(path) = iter.next() else {
                    bail!("{arg} requires a path");
                };
                opts.config = Some(PathBuf::from(path));
            }
            other => {
                if let Some(path) = other.strip_prefix("--config=") {
                    opts.config = Some(PathBuf::from(path));
                    continue;
                }
                let mut rest = vec![arg.clone()];
                rest.extend(iter.cloned());
                return Ok((opts, rest));
            }
        }
    }
    Ok((opts, Vec::new()))
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        // The stderr sink already prints these.
        "debug,sshcred::debug=off"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    if verbose {
        set_debug(StderrSink::new("sshcred: "));
    }
}

// ---------------------------------------------------------------------------
// Key loading
// ---------------------------------------------------------------------------

fn load_identity(config: &Config, key: &Path) -> Result<SigningIdentity> {
    // Questions go to stderr so stdout stays clean for key material.
    let mut prompter = io_prompt(io::stdin(), io::stderr());
    let options = UnlockOptions::from(config.prompt.clone());
    Ok(unlock_signer(key, &mut prompter, &options)?)
}

/// Like [`load_identity`], but for when stdin carries data: any passphrase is
/// read from the controlling terminal.
fn load_identity_on_tty(config: &Config, key: &Path) -> Result<SigningIdentity> {
    let options = UnlockOptions::from(config.prompt.clone());
    unlock_signer(key, &mut TtyPrompter::new(), &options)
        .context("stdin carries the message, so the passphrase is read from the terminal")
}

fn single_key(args: &[String], usage: &str) -> Result<PathBuf> {
    match args {
        [key] => Ok(resolve_key_path(key)),
        _ => bail!("usage: {usage}"),
    }
}

fn connect_agent(config: &Config) -> Result<AgentClient> {
    match &config.agent.socket {
        Some(socket) => agent_with_socket(socket)
            .with_context(|| format!("connecting to agent socket from config {socket:?}")),
        None => std_agent().context("connecting to SSH agent"),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_pubkey(config: &Config, args: &[String]) -> Result<()> {
    let key = single_key(args, "sshcred pubkey <key>")?;
    let identity = load_identity(config, &key)?;
    println!("{}", identity.public_key_openssh()?);
    Ok(())
}

fn cmd_fingerprint(config: &Config, args: &[String]) -> Result<()> {
    let key = single_key(args, "sshcred fingerprint <key>")?;
    let identity = load_identity(config, &key)?;
    println!(
        "{} {} ({})",
        identity.fingerprint(),
        identity.comment(),
        identity.algorithm()
    );
    Ok(())
}

fn cmd_sign(config: &Config, args: &[String]) -> Result<()> {
    let mut namespace = DEFAULT_NAMESPACE.to_string();
    let mut positional = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if arg == "--namespace" || arg == "-n" {
            let Some(ns) = iter.next() else {
                bail!("{arg} requires a value");
            };
            namespace = ns.clone();
        } else if let Some(ns) = arg.strip_prefix("--namespace=") {
            namespace = ns.to_string();
        } else {
            positional.push(arg.as_str());
        }
    }

    let [key, file] = positional[..] else {
        bail!("usage: sshcred sign [--namespace <ns>] <key> <file>");
    };
    if namespace.is_empty() {
        bail!("namespace must not be empty");
    }

    // The key is unlocked before the message is read so a passphrase prompt
    // never competes with the message for stdin.
    let key = resolve_key_path(key);
    let (identity, message) = if file == "-" {
        let identity = load_identity_on_tty(config, &key)?;
        (identity, read_message(io::stdin())?)
    } else {
        let identity = load_identity(config, &key)?;
        let message = std::fs::read(file).with_context(|| format!("reading {file}"))?;
        (identity, message)
    };
    let armored = identity
        .sign_sshsig(&namespace, &message)
        .context("creating SSH signature")?;
    print!("{armored}");
    Ok(())
}

fn read_message(mut input: impl io::Read) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    input
        .read_to_end(&mut buf)
        .context("reading message from stdin")?;
    Ok(buf)
}

fn cmd_add(config: &Config, args: &[String]) -> Result<()> {
    let keys: Vec<PathBuf> = if args.is_empty() {
        config.keys.resolve()
    } else {
        args.iter().map(|k| resolve_key_path(k)).collect()
    };
    if keys.is_empty() {
        bail!("no keys given and [keys] default is empty in the config");
    }

    let mut agent = connect_agent(config)?;
    for key in &keys {
        let identity = load_identity(config, key)?;
        agent
            .add_identity(&identity)
            .with_context(|| format!("adding {} to agent", key.display()))?;
        eprintln!("Identity added: {} ({})", key.display(), identity.fingerprint());
    }
    Ok(())
}

fn cmd_list(config: &Config) -> Result<()> {
    let mut agent = connect_agent(config)?;
    let keys = agent.list_identities()?;
    if keys.is_empty() {
        eprintln!("The agent has no identities.");
        return Ok(());
    }
    for key in keys {
        println!(
            "{} {} ({})",
            key.fingerprint(sshcred_core::signer::FINGERPRINT_HASH),
            key.comment(),
            key.algorithm()
        );
    }
    Ok(())
}
