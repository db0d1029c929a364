//! OSC over UDP for lighting desks and show controllers.
//!
//! Inbound packets are decoded with `rosc`; bundles are flattened and each
//! message runs as its own task.  Arguments are read leniently: a duration may
//! arrive as an int, a float or a numeric string.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use rosc::{OscMessage, OscPacket, OscType};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use showdeck_shared::constants::MAX_OSC_PACKET_SIZE;
use showdeck_shared::protocol::osc;

use crate::bridge::{Command, ControlBridge, Origin};
use crate::capabilities;
use crate::config::ServerConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OscInputError {
    #[error("unknown OSC address {0}")]
    UnknownAddress(String),

    #[error("{addr} expects {expected}")]
    BadArgument {
        addr: String,
        expected: &'static str,
    },
}

/// Map an inbound message to a bridge command.
pub fn parse_command(msg: &OscMessage) -> Result<Command, OscInputError> {
    let bad = |expected| OscInputError::BadArgument {
        addr: msg.addr.clone(),
        expected,
    };
    let first = msg.args.first();

    match msg.addr.as_str() {
        osc::LOGO_CHANGE => first
            .and_then(arg_as_string)
            .filter(|id| !id.is_empty())
            .map(|logo_id| Command::ChangeLogo { logo_id })
            .ok_or_else(|| bad("a logo id")),
        osc::TIMER_START => first
            .and_then(arg_as_i64)
            .map(|duration_ms| Command::StartTimer { duration_ms })
            .ok_or_else(|| bad("a duration in milliseconds")),
        osc::TIMER_STOP => Ok(Command::Stop),
        osc::TIMER_RESET => Ok(Command::ResetTimer),
        osc::SYNC_TRIGGER => Ok(Command::TriggerSync),
        osc::SYNC_OFFLINE => first
            .and_then(arg_as_bool)
            .map(|enabled| Command::SetOffline { enabled })
            .ok_or_else(|| bad("a boolean")),
        other => Err(OscInputError::UnknownAddress(other.to_string())),
    }
}

fn arg_as_string(arg: &OscType) -> Option<String> {
    match arg {
        OscType::String(s) => Some(s.trim().to_string()),
        OscType::Int(i) => Some(i.to_string()),
        OscType::Long(l) => Some(l.to_string()),
        _ => None,
    }
}

fn arg_as_i64(arg: &OscType) -> Option<i64> {
    match arg {
        OscType::Int(i) => Some(i64::from(*i)),
        OscType::Long(l) => Some(*l),
        OscType::Float(f) if f.is_finite() => Some(f.round() as i64),
        OscType::Double(d) if d.is_finite() => Some(d.round() as i64),
        OscType::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|d| d.is_finite()).map(|d| d.round() as i64))
        }
        _ => None,
    }
}

fn arg_as_bool(arg: &OscType) -> Option<bool> {
    match arg {
        OscType::Bool(b) => Some(*b),
        OscType::Int(i) => Some(*i != 0),
        OscType::Long(l) => Some(*l != 0),
        OscType::Float(f) => Some(*f != 0.0),
        OscType::Double(d) => Some(*d != 0.0),
        OscType::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Some(true),
            "false" | "0" | "off" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Status target implied by an address prefix.
fn target_of(addr: &str) -> Option<&'static str> {
    if addr.starts_with("/logo/") {
        Some("logo")
    } else if addr.starts_with("/timer/") {
        Some("timer")
    } else if addr.starts_with("/sync/") {
        Some("sync")
    } else {
        None
    }
}

fn flatten(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(msg) => out.push(msg),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten(inner, out);
            }
        }
    }
}

async fn handle_message(bridge: &ControlBridge, msg: OscMessage) {
    debug!(addr = %msg.addr, args = ?msg.args, "OSC message");
    match parse_command(&msg) {
        Ok(command) => {
            // The bridge has already replied on the status address.
            let _ = bridge.execute(Origin::Osc, command).await;
        }
        Err(e) => {
            warn!(error = %e, "Rejected OSC message");
            if let Some(target) = target_of(&msg.addr) {
                bridge.osc_error(target, msg.args.first().cloned(), &e.to_string());
            }
        }
    }
}

/// Read commands from `socket` until the task is aborted.
pub async fn run_listener(socket: UdpSocket, bridge: Arc<ControlBridge>) {
    let mut buf = vec![0u8; MAX_OSC_PACKET_SIZE];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!(error = %e, "OSC receive failed");
                continue;
            }
        };

        if !bridge.services().capabilities.is_enabled(capabilities::OSC) {
            debug!(%peer, "OSC disabled, packet dropped");
            continue;
        }

        let packet = match rosc::decoder::decode_udp(&buf[..len]) {
            Ok((_, packet)) => packet,
            Err(e) => {
                warn!(%peer, error = ?e, "Malformed OSC packet");
                continue;
            }
        };

        let mut messages = Vec::new();
        flatten(packet, &mut messages);
        for msg in messages {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { handle_message(&bridge, msg).await });
        }
    }
}

/// Deliver queued messages to the OSC client.
pub async fn run_sender(
    socket: UdpSocket,
    target: SocketAddr,
    mut outbound: mpsc::UnboundedReceiver<OscMessage>,
) {
    while let Some(msg) = outbound.recv().await {
        let addr = msg.addr.clone();
        let bytes = match rosc::encoder::encode(&OscPacket::Message(msg)) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(addr = %addr, error = ?e, "OSC encode failed");
                continue;
            }
        };
        if let Err(e) = socket.send_to(&bytes, target).await {
            warn!(addr = %addr, %target, error = %e, "OSC send failed");
        }
    }
}

/// Bind both sockets and start the listener and sender tasks.
pub async fn spawn(
    config: &ServerConfig,
    bridge: Arc<ControlBridge>,
    outbound: mpsc::UnboundedReceiver<OscMessage>,
) -> anyhow::Result<(JoinHandle<()>, JoinHandle<()>)> {
    let listener = UdpSocket::bind(config.osc_listen_addr)
        .await
        .with_context(|| format!("binding OSC listener on {}", config.osc_listen_addr))?;

    let local: SocketAddr = if config.osc_client_addr.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let sender = UdpSocket::bind(local)
        .await
        .context("binding OSC sender socket")?;

    info!(
        listen = %config.osc_listen_addr,
        client = %config.osc_client_addr,
        "OSC bridge running"
    );

    let listen_task = tokio::spawn(run_listener(listener, bridge));
    let send_task = tokio::spawn(run_sender(sender, config.osc_client_addr, outbound));
    Ok((listen_task, send_task))
}
