//! Blocking SDK client for a hub server.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, trace};

use crate::color::Color;
use crate::controller::ControllerInfo;
use crate::error::{Error, Result};
use crate::protocol::{read_packet, write_packet, Reply, Request};

/// How long to wait for a reply before giving up.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// One connection to a hub server.
///
/// Color updates are fire-and-forget: the server answers them only on
/// failure, so such an error reply surfaces as [`Error::Remote`] from the
/// next query on this connection.
pub struct HubClient {
    stream: TcpStream,
}

impl HubClient {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(REPLY_TIMEOUT))?;
        stream.set_nodelay(true)?;
        debug!(peer = ?stream.peer_addr().ok(), "Connected to hub");
        Ok(Self { stream })
    }

    fn send(&mut self, request: &Request) -> Result<()> {
        let packet = request.encode()?;
        trace!(packet_id = packet.packet_id, len = packet.payload.len(), "TX");
        write_packet(&mut self.stream, &packet)
    }

    /// Send `request` and read until its reply arrives.
    ///
    /// Error replies to earlier updates are consumed on the way; the first
    /// one is returned in place of the reply so the stream stays in step.
    fn query(&mut self, request: &Request) -> Result<Reply> {
        self.send(request)?;
        let mut stale = None;
        loop {
            let packet = read_packet(&mut self.stream)?
                .ok_or_else(|| Error::Protocol("server closed the connection".into()))?;
            let reply = match Reply::decode(&packet)? {
                Reply::Error {
                    code, request_id, ..
                } => {
                    let err = Error::Remote {
                        code: code as u32,
                        packet_id: request_id,
                    };
                    if request_id != request.packet_id() {
                        debug!(error = %err, "Earlier update failed");
                        stale.get_or_insert(err);
                        continue;
                    }
                    Err(err)
                }
                reply => Ok(reply),
            };
            return match stale {
                Some(err) => Err(err),
                None => reply,
            };
        }
    }

    /// Label this connection in the server's client list.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        self.send(&Request::SetClientName {
            name: name.to_string(),
        })
    }

    pub fn controller_count(&mut self) -> Result<u32> {
        match self.query(&Request::ControllerCount)? {
            Reply::ControllerCount(count) => Ok(count),
            other => Err(unexpected(&other)),
        }
    }

    pub fn controller_data(&mut self, index: u32) -> Result<ControllerInfo> {
        match self.query(&Request::ControllerData { index })? {
            Reply::ControllerData { info, .. } => Ok(info),
            other => Err(unexpected(&other)),
        }
    }

    pub fn update_leds(&mut self, index: u32, colors: &[Color]) -> Result<()> {
        self.send(&Request::UpdateLeds {
            index,
            colors: colors.to_vec(),
        })
    }

    pub fn update_zone_leds(&mut self, index: u32, zone: u32, colors: &[Color]) -> Result<()> {
        self.send(&Request::UpdateZoneLeds {
            index,
            zone,
            colors: colors.to_vec(),
        })
    }

    pub fn update_single_led(&mut self, index: u32, led: u32, color: Color) -> Result<()> {
        let led = i32::try_from(led)
            .map_err(|_| Error::LayoutIndex {
                field: "led",
                index: led as usize,
            })?;
        self.send(&Request::UpdateSingleLed { index, led, color })
    }
}

fn unexpected(reply: &Reply) -> Error {
    Error::Protocol(format!("unexpected reply {reply:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::testing::RecordingController;
    use crate::controller::ControllerRegistry;
    use crate::protocol::{packet_id, ErrorCode, MAX_WIRE_COUNT};
    use crate::server::DistributionServer;
    use std::sync::Arc;

    fn serve(zone_sizes: &[usize]) -> DistributionServer {
        let registry = Arc::new(ControllerRegistry::new());
        registry.push(Box::new(RecordingController::new("strip", zone_sizes)));
        let server = DistributionServer::new(registry);
        server.set_port(0).unwrap();
        server.start().unwrap();
        server
    }

    #[test]
    fn queries_controller_layout() {
        let server = serve(&[2, 3]);
        let mut client = HubClient::connect(("127.0.0.1", server.port())).unwrap();
        assert_eq!(client.controller_count().unwrap(), 1);

        let info = client.controller_data(0).unwrap();
        assert_eq!(info.name, "strip");
        assert_eq!(info.zones.len(), 2);
        assert_eq!(info.colors, vec![Color::BLACK; 5]);
    }

    #[test]
    fn out_of_range_data_is_remote_error() {
        let server = serve(&[1]);
        let mut client = HubClient::connect(("127.0.0.1", server.port())).unwrap();
        match client.controller_data(3) {
            Err(Error::Remote {
                code,
                packet_id: request_id,
            }) => {
                assert_eq!(code, ErrorCode::ControllerIndex as u32);
                assert_eq!(request_id, packet_id::REQUEST_CONTROLLER_DATA);
            }
            other => panic!("expected remote error, got {other:?}"),
        }
        // The connection survives the error.
        assert_eq!(client.controller_count().unwrap(), 1);
    }

    #[test]
    fn updates_are_visible_in_controller_data() {
        let server = serve(&[1, 2]);
        let mut client = HubClient::connect(("127.0.0.1", server.port())).unwrap();
        let red = Color::new(0xFF, 0, 0);

        client.update_leds(0, &[red; 3]).unwrap();
        client.update_zone_leds(0, 1, &[Color::WHITE; 2]).unwrap();
        client.update_single_led(0, 0, Color::BLACK).unwrap();

        let info = client.controller_data(0).unwrap();
        assert_eq!(info.colors, vec![Color::BLACK, Color::WHITE, Color::WHITE]);
    }

    #[test]
    fn failed_update_reported_on_next_query() {
        let server = serve(&[2]);
        let mut client = HubClient::connect(("127.0.0.1", server.port())).unwrap();
        client.update_leds(0, &[Color::WHITE; 7]).unwrap();
        assert!(matches!(
            client.controller_count(),
            Err(Error::Remote { packet_id: id, .. }) if id == packet_id::UPDATE_LEDS
        ));
        // The count reply was consumed; the next query lines up again.
        assert_eq!(client.controller_count().unwrap(), 1);
    }

    #[test]
    fn oversized_update_fails_locally() {
        let server = serve(&[2]);
        let mut client = HubClient::connect(("127.0.0.1", server.port())).unwrap();
        let colors = vec![Color::WHITE; MAX_WIRE_COUNT + 1];
        assert!(matches!(
            client.update_leds(0, &colors),
            Err(Error::TooMany { .. })
        ));
        // Nothing was sent, so the stream is still in step.
        assert_eq!(client.controller_count().unwrap(), 1);
    }
}
