//! # Simulator Server Module
//!
//! This module abstracts over the networking side of the executable. The
//! server accepts a connection from the simulator, receives telemetry
//! frames and sends back steering demands, manual acknowledgements, or
//! reset commands.
//!
//! The link is a request-reply pair: every frame received from the
//! simulator must be answered with exactly one response.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
    sim::{self, SimMessage, SimMessageError, SimResponse},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An abstraction over the network link to the simulator.
pub struct SimServer {
    /// REP socket carrying telemetry in and demands out.
    telem_socket: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur in the [`SimServer`]
#[derive(thiserror::Error, Debug)]
pub enum SimServerError {
    #[error("Socket error: {0}")]
    SocketError(#[from] MonitoredSocketError),

    #[error("Could not receive a frame from the simulator: {0}")]
    RecvError(zmq::Error),

    #[error("Could not send a response to the simulator: {0}")]
    SendError(zmq::Error),

    #[error("Received a frame which could not be decoded: {0}")]
    MalformedFrame(#[from] SimMessageError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimServer {
    /// Create a new instance of the simulator server.
    ///
    /// This function will not wait for a connection from the simulator
    /// before returning.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, SimServerError> {
        // Create the socket options
        let telem_socket_options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            recv_timeout: 200,
            send_timeout: 10,
            ..Default::default()
        };

        // Create the socket
        let telem_socket = MonitoredSocket::new(
            ctx,
            zmq::REP,
            telem_socket_options,
            &params.sim_endpoint,
        )?;

        Ok(Self { telem_socket })
    }

    /// Retrieve the next message from the simulator.
    ///
    /// The caller MUST call [`SimServer::send_response`] for every message
    /// returned here, the link alternates strictly between receive and
    /// send.
    ///
    /// `Ok(None)` is returned if no frame arrived within the receive
    /// timeout. A frame which cannot be decoded is an error: the link is
    /// assumed reliable, so a malformed frame means the two ends disagree
    /// about the protocol.
    pub fn get_telemetry(&mut self) -> Result<Option<SimMessage>, SimServerError> {
        let msg = match self.telem_socket.recv_msg(0) {
            Ok(m) => m,
            Err(zmq::Error::EAGAIN) => return Ok(None),
            Err(e) => return Err(SimServerError::RecvError(e)),
        };

        let message = sim::parse_frame(msg.as_str().unwrap_or(""))?;

        Ok(Some(message))
    }

    /// Send a response to the simulator for the last received message.
    pub fn send_response(&mut self, response: &SimResponse) -> Result<(), SimServerError> {
        self.telem_socket
            .send(response.to_frame().as_str(), 0)
            .map_err(SimServerError::SendError)
    }
}
