//! OBEX Object Push over Bluetooth, driven through the BlueZ command line
//! tools.
//!
//! | step       | tool                                            |
//! |------------|-------------------------------------------------|
//! | discover   | `sdptool search --bdaddr <id> OPUSH` (channel)  |
//! | name       | `hcitool name <id>`                             |
//! | connect    | `l2ping -c 1 <id>`                              |
//! | send       | `obexftp ... --put <file>`, one call per file   |
//!
//! obexftp opens and closes its own connection per file, so disconnecting
//! has nothing to tear down.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use bluetube_core::contract::{Device, DeviceLink};
use bluetube_core::error::{DeliveryError, ToolError};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::executor::CommandExecutor;

const SDPTOOL: &str = "sdptool";
const HCITOOL: &str = "hcitool";
const L2PING: &str = "l2ping";
const OBEXFTP: &str = "obexftp";

/// The RFCOMM channel of the OPUSH service in `sdptool` output.
pub fn parse_opush_channel(sdp_output: &str) -> Option<u16> {
    static CHANNEL: OnceLock<Option<Regex>> = OnceLock::new();
    let re = CHANNEL
        .get_or_init(|| Regex::new(r"Channel:\s*(\d+)").ok())
        .as_ref()?;
    re.captures(sdp_output)?.get(1)?.as_str().parse().ok()
}

pub struct ObexLink {
    executor: CommandExecutor,
}

impl ObexLink {
    pub fn new(executor: CommandExecutor) -> Self {
        Self { executor }
    }

    fn put_args(device: &Device, file: &Path) -> Vec<String> {
        vec![
            "--nopath".to_string(),
            "--noconn".to_string(),
            "--uuid".to_string(),
            "none".to_string(),
            "--bluetooth".to_string(),
            device.id.clone(),
            "--channel".to_string(),
            device.channel.to_string(),
            "--put".to_string(),
            file.display().to_string(),
        ]
    }
}

fn connect_error(device_id: &str, e: ToolError) -> DeliveryError {
    DeliveryError::Connect {
        device: device_id.to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl DeviceLink for ObexLink {
    async fn discover(&self, device_id: &str) -> Result<Option<Device>, DeliveryError> {
        let args = vec![
            "search".to_string(),
            "--bdaddr".to_string(),
            device_id.to_string(),
            "OPUSH".to_string(),
        ];
        let sdp = self
            .executor
            .output(SDPTOOL, &args)
            .await
            .map_err(|e| connect_error(device_id, e))?;
        let Some(channel) = parse_opush_channel(&sdp) else {
            debug!(device_id, "[OBEX] No OPUSH service found");
            return Ok(None);
        };

        let name = match self
            .executor
            .output(HCITOOL, &["name".to_string(), device_id.to_string()])
            .await
        {
            Ok(out) if !out.trim().is_empty() => out.trim().to_string(),
            Ok(_) => device_id.to_string(),
            Err(e) => {
                warn!(device_id, error = %e, "[OBEX] Cannot read the device name");
                device_id.to_string()
            }
        };
        Ok(Some(Device {
            id: device_id.to_string(),
            name,
            channel,
        }))
    }

    async fn connect(&self, device: &Device) -> Result<(), DeliveryError> {
        let args = vec!["-c".to_string(), "1".to_string(), device.id.clone()];
        self.executor
            .call(L2PING, &args, None)
            .await
            .map_err(|e| connect_error(&device.id, e))?;
        info!(device = %device.name, "[OBEX] Device is reachable");
        Ok(())
    }

    async fn send(&self, device: &Device, files: &[PathBuf]) -> Vec<PathBuf> {
        let mut sent = Vec::with_capacity(files.len());
        for file in files {
            match self
                .executor
                .call(OBEXFTP, &Self::put_args(device, file), None)
                .await
            {
                Ok(()) => {
                    info!(device = %device.name, file = %file.display(), "[OBEX] Sent");
                    sent.push(file.clone());
                }
                Err(e) => {
                    warn!(device = %device.name, file = %file.display(), error = %e, "[OBEX] Sending failed")
                }
            }
        }
        sent
    }

    async fn disconnect(&self, device: &Device) {
        debug!(device = %device.name, "[OBEX] Done with device");
    }
}
