// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implements the `query` and `check` commands.

use std::fmt::Write;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use env_logger::Env;
use log::{error, info};

use nsquery::query::{self, Client};
use nsquery::server::Server;
use nsquery::stats::Counter;

use crate::args::{CheckArgs, QueryArgs};
use crate::config;
use crate::zones;

/// Answers the question given on the command line and prints the
/// response.
pub fn query(args: QueryArgs) {
    env_logger::init_from_env(Env::new().default_filter_or("warn"));
    exit_on_failure(try_querying(args));
}

/// Loads the configuration and summarizes it.
pub fn check(args: CheckArgs) {
    env_logger::init_from_env(Env::new().default_filter_or("warn"));
    exit_on_failure(try_checking(args));
}

/// Logs the chain of causes of a failure and exits.
fn exit_on_failure(result: Result<()>) {
    if let Err(e) = result {
        let mut message = String::from("Failed:");
        for (i, cause) in e.chain().enumerate() {
            write!(message, "\n[{}] {}", i + 1, cause).unwrap();
        }
        message.push_str("\nExiting with failure.");
        error!("{}", message);
        process::exit(1);
    }
}

fn try_querying(args: QueryArgs) -> Result<()> {
    let request = args.request()?;
    info!("Loading the configuration from {}.", args.config.display());
    let config = config::load_from_path(&args.config).context("failed to load the configuration")?;
    let view = Arc::new(zones::load(&config, nsquery::unix_time())?);
    let server = Arc::new(Server::new(
        config.recursive_clients,
        config.recursive_clients_soft,
    ));
    let client = if args.tcp {
        Client::tcp(args.from)
    } else {
        Client::udp(args.from)
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()
        .context("failed to start the runtime")?;
    let response = runtime.block_on(query::start(server.clone(), view, client, request));

    match response {
        Some(response) => println!("{}", response),
        None => println!(";; no response"),
    }
    if args.stats {
        println!();
        for counter in Counter::ALL {
            println!(";; {:<10} {}", counter, server.stats.get(counter));
        }
    }
    Ok(())
}

fn try_checking(args: CheckArgs) -> Result<()> {
    let config = config::load_from_path(&args.config).context("failed to load the configuration")?;
    let view = zones::load(&config, nsquery::unix_time())?;
    println!("class {}", view.class);
    for zone in view.zones.iter() {
        println!("zone {}", zone.name());
    }
    if view.hints.is_some() {
        println!("root hints loaded");
    }
    Ok(())
}
