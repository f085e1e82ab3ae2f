/*
 * This file is a part of respd
 *
 * Copyright (c) 2024, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # Configuration
//!
//! The `respd` analogue of Skytable's `config::cfgcli`, scoped down to the handful of flags this
//! core actually consumes: a `clap::Parser`-derived `Cli`, resolved once at startup into a plain
//! [`ServerConfig`] that the rest of the binary reaches by value, not by re-parsing `env::args()`
//! from wherever it's needed.

#[cfg(test)]
mod tests;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::Parser;

use crate::util::{Error, SkyResult};

const DEFAULT_PORT: u16 = 6379;
/// Scaled down from upstream's `MAXIMUM_CONNECTION_LIMIT` (which sizes for a production
/// multi-tenant deployment); a sane default for a single-node instance of this core.
const DEFAULT_MAXCON: usize = 50_000;

#[derive(Parser, Debug)]
#[command(name = "respd", about = "An in-memory key/value server speaking RESP")]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Address to bind the listener to
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,
    /// Maximum number of simultaneous client connections
    #[arg(long, default_value_t = DEFAULT_MAXCON)]
    maxcon: usize,
    /// Start as a replica of the given master (replica-side behavior is out of scope for this
    /// core; supplying this flag logs a warning and the process still starts as a master)
    #[arg(long, num_args = 2, value_names = ["HOST", "PORT"])]
    replicaof: Option<Vec<String>>,
}

/// Fully resolved server configuration, built once in `main` and handed by reference/value to
/// the listener and connection tasks.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_connections: usize,
    pub replicaof: Option<(String, u16)>,
}

impl ServerConfig {
    /// Parse `std::env::args()` into a [`ServerConfig`]. Any malformed flag is reported to the
    /// caller rather than panicking -- `main` turns this into a non-zero exit (§6 "non-zero on
    /// any startup configuration failure").
    pub fn from_args() -> SkyResult<Self> {
        let cli = Cli::parse();
        Self::from_cli(cli)
    }

    fn from_cli(cli: Cli) -> SkyResult<Self> {
        let replicaof = match cli.replicaof {
            None => None,
            Some(pair) => {
                let [host, port_str] = <[String; 2]>::try_from(pair)
                    .map_err(|_| Error::Other("--replicaof takes exactly HOST and PORT".into()))?;
                let port = port_str
                    .parse::<u16>()
                    .map_err(|_| Error::Other(format!("--replicaof: '{port_str}' is not a valid port")))?;
                Some((host, port))
            }
        };
        Ok(Self {
            bind_addr: SocketAddr::new(cli.bind, cli.port),
            max_connections: cli.maxcon,
            replicaof,
        })
    }
}
