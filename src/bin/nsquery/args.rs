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

//! Implements command-line argument parsing.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};

use nsquery::message::{Question, Request};

/// Parses the command line arguments.
pub fn parse() -> Args {
    Args::parse()
}

/// Answer DNS questions from the zones and cache of a configured view
#[derive(Debug, Parser)]
#[command(author, version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Answer a single question and print the response
    Query(QueryArgs),

    /// Load the configuration and summarize it
    Check(CheckArgs),
}

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// Set the configuration file to use
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,

    /// Set the address the query appears to come from
    #[arg(long, default_value = "127.0.0.1:53000", value_name = "IP:PORT")]
    pub from: SocketAddr,

    /// Pretend the query arrived over TCP
    #[arg(long)]
    pub tcp: bool,

    /// Clear the RD (recursion desired) bit
    #[arg(long)]
    pub norecurse: bool,

    /// Set the DO (DNSSEC OK) bit
    #[arg(long)]
    pub dnssec: bool,

    /// Set the CD (checking disabled) bit
    #[arg(long)]
    pub cd: bool,

    /// Print the query counters after the response
    #[arg(long)]
    pub stats: bool,

    /// The question, as NAME [TYPE [CLASS]]
    #[arg(required = true, num_args = 1..=3, value_name = "QUESTION")]
    pub question: Vec<String>,
}

impl QueryArgs {
    /// Builds the request described by the arguments.
    pub fn request(&self) -> Result<Request> {
        let question: Question = self
            .question
            .join(" ")
            .parse()
            .map_err(|e| anyhow!("invalid question: {}", e))?;
        let mut request = Request::new(rand::random(), question);
        request.rd = !self.norecurse;
        request.dnssec_ok = self.dnssec;
        request.cd = self.cd;
        Ok(request)
    }
}

#[derive(Debug, Parser)]
pub struct CheckArgs {
    /// Set the configuration file to use
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,
}
