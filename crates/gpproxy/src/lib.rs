// gpproxy - Ethereum JSON-RPC Gateway
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
// SPDX-License-Identifier: AGPL-3.0
//! gpproxy Gateway Library
//!
//! A transparent gateway in front of a single Ethereum JSON-RPC node. HTTP requests
//! and WebSocket streams are relayed to the node unchanged, except on
//! `/eth/gasprice`, where a bare request is completed into an `eth_gasPrice` call
//! before it is forwarded.

pub mod api;
pub mod config;
pub mod error;
pub mod http_forwarder;
pub mod metrics;
pub mod node;
pub mod normalize;
pub mod proxy;
pub mod rpc;
pub mod ws_forwarder;

pub use config::Config;
pub use error::{GatewayError, NormalizeError};
pub use metrics::{Metrics, MetricsRegistry};
pub use node::{Node, NodeService};
pub use proxy::{ProxyServer, ProxyServerBuilder};
