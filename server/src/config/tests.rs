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

use super::*;
use clap::Parser;

fn parse(args: &[&str]) -> ServerConfig {
    let cli = Cli::parse_from(std::iter::once(&"respd").chain(args));
    ServerConfig::from_cli(cli).expect("valid cli args")
}

#[test]
fn defaults_bind_to_all_interfaces_on_6379() {
    let cfg = parse(&[]);
    assert_eq!(cfg.bind_addr, "0.0.0.0:6379".parse().unwrap());
    assert_eq!(cfg.max_connections, DEFAULT_MAXCON);
    assert!(cfg.replicaof.is_none());
}

#[test]
fn explicit_port_and_bind_are_honored() {
    let cfg = parse(&["--port", "7000", "--bind", "127.0.0.1"]);
    assert_eq!(cfg.bind_addr, "127.0.0.1:7000".parse().unwrap());
}

#[test]
fn replicaof_is_parsed_into_host_and_port() {
    let cfg = parse(&["--replicaof", "10.0.0.5", "6380"]);
    assert_eq!(cfg.replicaof, Some(("10.0.0.5".to_owned(), 6380)));
}

#[test]
fn replicaof_with_non_numeric_port_is_rejected() {
    let cli = Cli::parse_from(["respd", "--replicaof", "10.0.0.5", "not-a-port"]);
    assert!(ServerConfig::from_cli(cli).is_err());
}
