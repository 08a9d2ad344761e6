//! devrig - drive an Android device from the host.
//!
//! Thin operator front end over the devrig library: installs, instrumentation
//! runs, settings, properties and one-off commands to companion apps.

use clap::{Parser, Subcommand, ValueEnum};
use devrig::{
    Error,
    config::{Config, ConfigModel},
    context::TestContext,
    device::{Device, SettingsNamespace},
    ids::{PackageName, UserId},
    install::InstallOutcome,
    shell::AdbExecutor,
};
use serde_json::{Map, Value};
use std::{fs, path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

/// devrig - host-side orchestration for Android devices under test
#[derive(Parser, Debug)]
#[command(name = "devrig")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a devrig.toml configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device serial (overrides the config file)
    #[arg(short, long)]
    serial: Option<String>,

    /// adb binary (overrides the config file)
    #[arg(long)]
    adb: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install one or more APKs in a single session
    Install {
        /// APK files; the first is usually the base
        #[arg(required = true)]
        apks: Vec<PathBuf>,

        /// Update an installed package in place, keeping its other splits
        #[arg(long)]
        inherit: Option<String>,

        /// Install for this user only
        #[arg(long)]
        user: Option<u32>,

        /// Make the package visible to every other app
        #[arg(long)]
        force_queryable: bool,

        /// Extra raw `pm install-create` argument (repeatable)
        #[arg(long = "arg", allow_hyphen_values = true)]
        args: Vec<String>,

        /// Require the install to fail with this text
        #[arg(long)]
        expect_failure: Option<String>,
    },

    /// Uninstall a package, or only some of its splits
    Uninstall {
        package: String,

        /// Split names to remove instead of the whole package
        splits: Vec<String>,
    },

    /// Wait until the device reports boot completed
    WaitBoot,

    /// Run on-device instrumentation tests
    Instrument {
        /// Test package
        package: String,

        /// Test class; a leading `.` is resolved against the package
        #[arg(long)]
        class: Option<String>,

        /// Single test method
        #[arg(long)]
        method: Option<String>,

        #[arg(long)]
        user: Option<u32>,

        /// Bound for the whole run in seconds (overrides the config file)
        #[arg(long)]
        timeout: Option<u64>,

        /// Instrumentation argument as key=value (repeatable)
        #[arg(short = 'e', long = "extra", value_parser = parse_key_value)]
        extras: Vec<(String, String)>,
    },

    /// Read or write a system setting
    #[command(subcommand)]
    Settings(SettingsCommands),

    /// Print a system property
    Getprop { key: String },

    /// Send a command to a companion app and print its answer
    Send {
        /// Package whose receiver handles the command
        source: String,

        action: String,

        /// Package the command is about
        #[arg(long)]
        target: Option<String>,

        /// JSON object payload
        #[arg(long)]
        payload: Option<String>,

        /// Do not wait for the readiness acknowledgement
        #[arg(long)]
        no_wait_ready: bool,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommands {
    Get {
        namespace: Namespace,
        key: String,
        #[arg(long)]
        user: Option<u32>,
    },
    Put {
        namespace: Namespace,
        key: String,
        value: String,
        #[arg(long)]
        user: Option<u32>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Namespace {
    Global,
    Secure,
    System,
}

impl From<Namespace> for SettingsNamespace {
    fn from(ns: Namespace) -> Self {
        match ns {
            Namespace::Global => Self::Global,
            Namespace::Secure => Self::Secure,
            Namespace::System => Self::System,
        }
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("devrig: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let config = load_config(&cli)?;
    let shell = Arc::new(AdbExecutor::from_config(&config));
    let device = Device::new(shell.clone(), config.clone());

    match cli.command {
        Commands::Install {
            apks,
            inherit,
            user,
            force_queryable,
            args,
            expect_failure,
        } => {
            let mut install = device.install_multiple();
            for apk in apks {
                install = install.add_file(apk);
            }
            if let Some(package) = inherit {
                install = install.inherit_from(package_name(&package)?);
            }
            if let Some(user) = user {
                install = install.for_user(UserId(user));
            }
            if force_queryable {
                install = install.force_queryable();
            }
            for arg in args {
                install = install.add_arg(arg);
            }

            match expect_failure {
                Some(expected) => {
                    let output = install.run_expecting_failure(&expected)?;
                    println!("{}", output.trim());
                }
                None => match install.execute()? {
                    InstallOutcome::Committed { session } => println!("Success (session {session})"),
                    InstallOutcome::Failed { phase, output } => {
                        return Err(Error::shell(format!("install {phase} failed: {}", output.trim())));
                    }
                },
            }
        }

        Commands::Uninstall { package, splits } => {
            let package = package_name(&package)?;
            if splits.is_empty() {
                device.uninstall_package(&package)?;
            } else {
                let splits: Vec<&str> = splits.iter().map(String::as_str).collect();
                device.uninstall_splits(&package, &splits)?;
            }
        }

        Commands::WaitBoot => {
            device.wait_for_boot_completed()?;
            println!("{} booted", device.describe());
        }

        Commands::Instrument {
            package,
            class,
            method,
            user,
            timeout,
            extras,
        } => {
            let mut run = device.instrumentation(&package_name(&package)?);
            if let Some(class) = class {
                run = run.class(class);
            }
            if let Some(method) = method {
                run = run.method(method);
            }
            if let Some(user) = user {
                run = run.user(UserId(user));
            }
            if let Some(secs) = timeout {
                run = run.timeout(Duration::from_secs(secs));
            }
            for (key, value) in extras {
                run = run.arg(key, value);
            }

            let report = run.run_checked(&device)?;
            println!("OK ({} tests)", report.passed());
        }

        Commands::Settings(SettingsCommands::Get {
            namespace,
            key,
            user,
        }) => {
            let value = match user {
                Some(user) => device.get_setting_for_user(UserId(user), namespace.into(), &key)?,
                None => device.get_setting(namespace.into(), &key)?,
            };
            println!("{}", value.as_deref().unwrap_or("null"));
        }

        Commands::Settings(SettingsCommands::Put {
            namespace,
            key,
            value,
            user,
        }) => match user {
            Some(user) => device.put_setting_for_user(UserId(user), namespace.into(), &key, &value)?,
            None => device.put_setting(namespace.into(), &key, &value)?,
        },

        Commands::Getprop { key } => {
            println!("{}", device.getprop(&key)?.unwrap_or_default());
        }

        Commands::Send {
            source,
            action,
            target,
            payload,
            no_wait_ready,
        } => {
            let ctx = TestContext::with_broadcast(shell, config)?;
            let source = package_name(&source)?;
            let target = target.as_deref().map(package_name).transpose()?;
            let payload = payload.as_deref().map(parse_payload).transpose()?;

            let answer = ctx
                .send_command(&source, target.as_ref(), payload, &action, !no_wait_ready)?
                .await_result()?;
            println!("{answer}");
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<Arc<ConfigModel>, Error> {
    let mut model = match &cli.config {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(|e| {
                Error::config(format!("cannot read config file '{}': {e}", path.display()))
            })?;
            Config::parse_toml(&raw)?
        }
        None => ConfigModel::default(),
    };

    if let Some(serial) = &cli.serial {
        model.device.serial = Some(serial.clone());
    }
    if let Some(adb) = &cli.adb {
        model.device.adb.clone_from(adb);
    }

    Ok(Config::init_from_model(model)?)
}

fn package_name(raw: &str) -> Result<PackageName, Error> {
    Ok(PackageName::new(raw)?)
}

fn parse_payload(raw: &str) -> Result<Map<String, Value>, Error> {
    serde_json::from_str(raw).map_err(|e| Error::assertion(format!("payload must be a JSON object: {e}")))
}

///
/// TESTS
///
