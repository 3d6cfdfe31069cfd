//! Per-connection request loop.
//!
//! A session reads one packet at a time and answers it before reading the
//! next, so replies go out in request order. Requests that fail while the
//! framing is intact are answered with an error reply and the session keeps
//! going; a framing error, an I/O error, or a clean disconnect ends it.

use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{read_packet, write_packet, ErrorCode, Packet, Reply, Request};
use crate::server::{ClientId, ServerShared};

/// One connected SDK client, run on its own thread.
pub struct ClientSession {
    id: ClientId,
    peer: SocketAddr,
    stream: TcpStream,
    shared: Arc<ServerShared>,
}

impl ClientSession {
    pub(crate) fn new(
        id: ClientId,
        peer: SocketAddr,
        stream: TcpStream,
        shared: Arc<ServerShared>,
    ) -> Self {
        Self {
            id,
            peer,
            stream,
            shared,
        }
    }

    /// Serve until the peer goes away, then drop this client's record.
    pub fn run(mut self) {
        match self.serve() {
            Ok(()) => info!(client = self.id, peer = %self.peer, "Client disconnected"),
            Err(e) => warn!(
                client = self.id,
                peer = %self.peer,
                error = %e,
                "Client session ended"
            ),
        }

        self.shared.clients.remove(self.id);
        let _ = self.stream.shutdown(Shutdown::Both);
        self.shared.client_info_changed();
    }

    fn serve(&mut self) -> Result<()> {
        while let Some(packet) = read_packet(&mut self.stream)? {
            trace!(
                client = self.id,
                device_index = packet.device_index,
                packet_id = packet.packet_id,
                len = packet.payload.len(),
                "RX"
            );
            if let Some(reply) = dispatch(&self.shared, self.id, &packet) {
                let encoded = encode_reply(self.id, &packet, &reply)?;
                write_packet(&mut self.stream, &encoded)?;
            }
        }
        Ok(())
    }
}

/// Handle one packet on behalf of client `id`. Returns the reply, if any.
pub(crate) fn dispatch(shared: &ServerShared, id: ClientId, packet: &Packet) -> Option<Reply> {
    match Request::decode(packet).and_then(|request| handle(shared, id, request)) {
        Ok(reply) => reply,
        Err(err) => {
            debug!(
                client = id,
                packet_id = packet.packet_id,
                error = %err,
                "Request failed"
            );
            Some(Reply::Error {
                index: packet.device_index,
                code: ErrorCode::for_error(&err),
                request_id: packet.packet_id,
            })
        }
    }
}

/// Encode `reply`; one that does not fit the wire becomes an error reply.
fn encode_reply(id: ClientId, request: &Packet, reply: &Reply) -> Result<Packet> {
    reply.encode().or_else(|err| {
        warn!(
            client = id,
            packet_id = request.packet_id,
            error = %err,
            "Reply does not fit the protocol"
        );
        Reply::Error {
            index: request.device_index,
            code: ErrorCode::for_error(&err),
            request_id: request.packet_id,
        }
        .encode()
    })
}

fn handle(shared: &ServerShared, id: ClientId, request: Request) -> Result<Option<Reply>> {
    let registry = &shared.registry;
    match request {
        Request::ControllerCount => Ok(Some(Reply::ControllerCount(registry.len() as u32))),
        Request::ControllerData { index } => {
            let info = registry.info(index as usize)?;
            Ok(Some(Reply::ControllerData { index, info }))
        }
        Request::SetClientName { name } => {
            info!(client = id, name = %name, "Client identified");
            shared.clients.relabel(id, name);
            shared.client_info_changed();
            Ok(None)
        }
        Request::UpdateLeds { index, colors } => {
            registry.with_controller(index as usize, |c| c.set_leds(&colors))?;
            Ok(None)
        }
        Request::UpdateZoneLeds {
            index,
            zone,
            colors,
        } => {
            registry.with_controller(index as usize, |c| {
                c.update_zone_leds(zone as usize, &colors)
            })?;
            Ok(None)
        }
        Request::UpdateSingleLed { index, led, color } => {
            let led = usize::try_from(led)
                .map_err(|_| Error::Protocol(format!("negative LED index {led}")))?;
            registry.with_controller(index as usize, |c| c.update_single_led(led, color))?;
            Ok(None)
        }
    }
}
