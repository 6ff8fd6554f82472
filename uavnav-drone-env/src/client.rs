//! TCP client of the drone simulator.
use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    io::{BufRead, BufReader, Write},
    net::TcpStream,
    sync::{Arc, Mutex},
};

/// Requests sent to the simulator, one JSON object per line.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum SimRequest {
    /// Respawns the vehicle at its start position.
    Reset,

    /// Applies a velocity command for one control period.
    Step { vx: f32, vy: f32, vz: f32 },
}

/// One simulator frame: the camera image and the vehicle state.
#[derive(Debug, Clone, Deserialize)]
pub struct SimFrame {
    /// Raw image bytes, row-major `(height, width, channels)`.
    pub image: Vec<u8>,

    /// Vehicle position in the world frame.
    pub position: [f32; 3],

    /// Whether the vehicle collided during the last control period.
    pub collided: bool,
}

/// Blocking client of the simulator process.
///
/// The protocol is line-delimited JSON: every request is answered with
/// one [`SimFrame`]. The client is shared by all environments of the
/// process (see [`SharedSimClient`]); only one environment steps it at a
/// time.
pub struct SimClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

/// The simulator client handle shared across environment instances.
pub type SharedSimClient = Arc<Mutex<SimClient>>;

impl SimClient {
    /// Connects to the simulator at the given address.
    pub fn connect(addr: &str) -> Result<Self> {
        let writer = TcpStream::connect(addr)
            .with_context(|| format!("Failed to connect to the simulator at {}", addr))?;
        writer.set_nodelay(true)?;
        let reader = BufReader::new(writer.try_clone()?);
        info!("Connected to the simulator at {}", addr);
        Ok(Self { reader, writer })
    }

    /// Wraps the client into the process-wide shared handle.
    pub fn into_shared(self) -> SharedSimClient {
        Arc::new(Mutex::new(self))
    }

    /// Respawns the vehicle and returns the initial frame.
    pub fn reset(&mut self) -> Result<SimFrame> {
        self.request(&SimRequest::Reset)
    }

    /// Applies a velocity command and returns the resulting frame.
    pub fn step(&mut self, v: [f32; 3]) -> Result<SimFrame> {
        self.request(&SimRequest::Step {
            vx: v[0],
            vy: v[1],
            vz: v[2],
        })
    }

    fn request(&mut self, req: &SimRequest) -> Result<SimFrame> {
        let mut line = serde_json::to_string(req)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;

        let mut resp = String::new();
        let n = self.reader.read_line(&mut resp)?;
        if n == 0 {
            anyhow::bail!("Simulator closed the connection");
        }
        let frame = serde_json::from_str(&resp)
            .with_context(|| format!("Malformed simulator frame: {}", resp.trim_end()))?;
        Ok(frame)
    }
}
