//! labipam CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use labipam::commands::binding::AssignOptions;
use labipam::commands::subnet::{NewDevice, NewSubnet};
use labipam::commands::{BindingCommand, SchemeCommand, SubnetCommand, TemplateCommand};
use labipam_api::AppContext;
use labipam_drivers::Settings;
use labipam_types::{AddressStatus, IpamError};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "labipam")]
#[command(about = "IPv4 address management for small sites")]
#[command(version)]
#[command(long_about = "
IPv4 address management for small sites

Keeps subnets, ranges and address records in the configured store and binds
addresses to inventory devices.

Examples:
  labipam subnets                              # List subnets of the default site
  labipam subnet add 192.168.1.0/24            # Create a subnet, gateway suggested
  labipam subnet add --template home-lan       # Create a subnet from a template
  labipam cells 3 --page 1                     # Show the second page of addresses
  labipam range add 3 192.168.1.100 192.168.1.199 dhcp
  labipam assign 3 192.168.1.10 --device 7     # Bind an address to a device
  labipam device-only                          # Device addresses without records
  labipam scheme save 3 home                   # Save the ranges of subnet 3
  labipam scheme apply 5 1 --replace           # Replace subnet 5's ranges
")]
struct Cli {
    /// Settings file (defaults to ./labipam.toml, then /etc/labipam/labipam.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Site to work on instead of the configured default
    #[arg(short, long, global = true)]
    site: Option<u64>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List subnets of the site
    Subnets,

    /// Create or delete subnets
    #[command(subcommand)]
    Subnet(SubnetAction),

    /// Show one page of a subnet's address grid
    Cells {
        subnet: u64,

        /// Zero-based page number
        #[arg(short, long, default_value_t = 0)]
        page: u32,

        /// Addresses per page
        #[arg(long)]
        page_size: Option<u32>,
    },

    /// Show subnet utilization
    Usage { subnet: u64 },

    /// List overlapping subnets of the site
    Overlaps,

    /// Print the first available address of a subnet
    NextFree { subnet: u64 },

    /// Manage ranges of a subnet
    #[command(subcommand)]
    Range(RangeAction),

    /// Manage inventory devices
    #[command(subcommand)]
    Device(DeviceAction),

    /// Device addresses that have no address record
    DeviceOnly,

    /// Create or edit an address record and bind it to a device
    Assign {
        subnet: u64,
        address: String,

        /// Device to bind the address to
        #[arg(long)]
        device: Option<u64>,

        /// Record status (active, reserved, dhcp, deprecated)
        #[arg(long)]
        status: Option<AddressStatus>,

        #[arg(long)]
        dns_name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Free-text owner shown in the address grid
        #[arg(long)]
        assigned_to: Option<String>,
    },

    /// Delete an address record; the device keeps its address
    Release { record: u64 },

    /// Clear a device's address field
    Unbind { device: u64 },

    /// Create a record for a device-only binding
    Promote { device: u64 },

    /// Save and apply range schemes
    #[command(subcommand)]
    Scheme(SchemeAction),

    /// Subnet templates
    #[command(subcommand)]
    Template(TemplateAction),
}

#[derive(Subcommand)]
enum SubnetAction {
    /// Create a subnet from a CIDR, a template, or both
    Add {
        /// Block in a.b.c.d/n notation
        cidr: Option<String>,

        /// Template to prefill from (home-lan, user:3, ...)
        #[arg(short, long)]
        template: Option<String>,

        #[arg(short, long)]
        gateway: Option<String>,

        #[arg(short, long)]
        role: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        vlan: Option<u64>,
    },

    /// Delete a subnet with its ranges and records
    Delete { subnet: u64 },
}

#[derive(Subcommand)]
enum RangeAction {
    /// Add a range to a subnet
    Add {
        subnet: u64,
        start: String,
        end: String,
        role: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// List ranges of a subnet with overlap warnings
    List { subnet: u64 },

    /// Delete a range
    Delete { range: u64 },
}

#[derive(Subcommand)]
enum DeviceAction {
    /// Add a device to the site
    Add {
        name: String,

        /// Address the device reports
        #[arg(short, long)]
        address: Option<String>,

        #[arg(long)]
        hostname: Option<String>,

        #[arg(long)]
        mac: Option<String>,
    },

    /// List devices of the site
    List,
}

#[derive(Subcommand)]
enum SchemeAction {
    /// Save the ranges of a subnet as a scheme
    Save {
        subnet: u64,
        name: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// Apply a scheme to a subnet
    Apply {
        subnet: u64,
        scheme: u64,

        /// Delete the subnet's existing ranges first
        #[arg(long)]
        replace: bool,
    },

    /// List saved schemes
    List,

    /// Delete a scheme
    Delete { scheme: u64 },
}

#[derive(Subcommand)]
enum TemplateAction {
    /// List built-in and user templates
    List,

    /// Show the values a template prefills
    Show { template: String },

    /// Save a subnet's layout as a user template
    Save {
        subnet: u64,
        name: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a user template
    Delete { template: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let result = run(&cli).await;

    match result {
        Ok(()) => {
            if !cli.quiet {
                log::info!("Command completed successfully");
            }
            std::process::exit(0);
        }
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {}", e);

                // Print error chain if in verbose mode
                if cli.verbose || cli.debug {
                    let mut source = e.source();
                    while let Some(err) = source {
                        eprintln!("  Caused by: {}", err);
                        source = err.source();
                    }
                }

                if let Some(IpamError::PartialFailure { record_id, .. }) =
                    e.downcast_ref::<IpamError>()
                {
                    eprintln!(
                        "Record {} was saved; run the same assignment again to finish the binding.",
                        record_id
                    );
                }
            }
            std::process::exit(1);
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    let site = cli.site.unwrap_or(settings.site);
    let context = AppContext::bootstrap(&settings).await?;
    let json = cli.json;

    match &cli.command {
        Commands::Subnets => SubnetCommand::new(context, json).list(site).await,

        Commands::Subnet(action) => {
            let cmd = SubnetCommand::new(context, json);
            match action {
                SubnetAction::Add {
                    cidr,
                    template,
                    gateway,
                    role,
                    description,
                    vlan,
                } => {
                    let options = NewSubnet {
                        cidr: cidr.clone(),
                        template: template.clone(),
                        gateway: gateway.clone(),
                        role: role.clone(),
                        description: description.clone(),
                        vlan: *vlan,
                    };
                    cmd.add(site, &options).await
                }
                SubnetAction::Delete { subnet } => cmd.delete(*subnet).await,
            }
        }

        Commands::Cells {
            subnet,
            page,
            page_size,
        } => {
            SubnetCommand::new(context, json)
                .cells(*subnet, *page, *page_size)
                .await
        }

        Commands::Usage { subnet } => SubnetCommand::new(context, json).usage(*subnet).await,

        Commands::Overlaps => SubnetCommand::new(context, json).overlaps(site).await,

        Commands::NextFree { subnet } => {
            SubnetCommand::new(context, json).next_free(*subnet).await
        }

        Commands::Range(action) => {
            let cmd = SubnetCommand::new(context, json);
            match action {
                RangeAction::Add {
                    subnet,
                    start,
                    end,
                    role,
                    description,
                } => {
                    cmd.add_range(*subnet, start, end, role, description.as_deref())
                        .await
                }
                RangeAction::List { subnet } => cmd.list_ranges(*subnet).await,
                RangeAction::Delete { range } => cmd.delete_range(*range).await,
            }
        }

        Commands::Device(action) => {
            let cmd = SubnetCommand::new(context, json);
            match action {
                DeviceAction::Add {
                    name,
                    address,
                    hostname,
                    mac,
                } => {
                    let options = NewDevice {
                        name: name.clone(),
                        address: address.clone(),
                        hostname: hostname.clone(),
                        mac: mac.clone(),
                    };
                    cmd.add_device(site, &options).await
                }
                DeviceAction::List => cmd.list_devices(site).await,
            }
        }

        Commands::DeviceOnly => BindingCommand::new(context, json).device_only(site).await,

        Commands::Assign {
            subnet,
            address,
            device,
            status,
            dns_name,
            description,
            assigned_to,
        } => {
            let options = AssignOptions {
                device: *device,
                status: *status,
                dns_name: dns_name.clone(),
                description: description.clone(),
                assigned_to: assigned_to.clone(),
            };
            BindingCommand::new(context, json)
                .assign(*subnet, address, options)
                .await
        }

        Commands::Release { record } => BindingCommand::new(context, json).release(*record).await,

        Commands::Unbind { device } => BindingCommand::new(context, json).unbind(*device).await,

        Commands::Promote { device } => BindingCommand::new(context, json).promote(*device).await,

        Commands::Scheme(action) => {
            let cmd = SchemeCommand::new(context, json);
            match action {
                SchemeAction::Save {
                    subnet,
                    name,
                    description,
                } => cmd.save(*subnet, name, description.as_deref()).await,
                SchemeAction::Apply {
                    subnet,
                    scheme,
                    replace,
                } => cmd.apply(*subnet, *scheme, *replace).await,
                SchemeAction::List => cmd.list().await,
                SchemeAction::Delete { scheme } => cmd.delete(*scheme).await,
            }
        }

        Commands::Template(action) => {
            let cmd = TemplateCommand::new(context, json);
            match action {
                TemplateAction::List => cmd.list().await,
                TemplateAction::Show { template } => cmd.show(template).await,
                TemplateAction::Save {
                    subnet,
                    name,
                    description,
                } => cmd.save(*subnet, name, description.as_deref()).await,
                TemplateAction::Delete { template } => cmd.delete(*template).await,
            }
        }
    }
}
