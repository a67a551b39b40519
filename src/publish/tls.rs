//! TLS transport selection.
//!
//! Mirrors Home Assistant's MQTT TLS options: a custom CA (or the bundled
//! webpki roots when none is given) and an optional client certificate/key
//! pair for mutual TLS.

use anyhow::{anyhow, Context, Result};
use rumqttc::Transport;
use std::path::Path;

use super::endpoint::MqttEndpoint;

/// PEM material for an MQTT TLS connection.
#[derive(Clone, Debug, Default)]
pub struct TlsMaterials {
    /// CA certificate. `None` means the default root store.
    pub ca: Option<Vec<u8>>,
    /// Client certificate and key, always provided together.
    pub client_auth: Option<(Vec<u8>, Vec<u8>)>,
}

impl TlsMaterials {
    pub fn load(
        ca_path: Option<&Path>,
        client_cert_path: Option<&Path>,
        client_key_path: Option<&Path>,
    ) -> Result<Self> {
        let ca = match ca_path {
            Some(path) => Some(
                std::fs::read(path)
                    .with_context(|| format!("failed to read MQTT TLS CA '{}'", path.display()))?,
            ),
            None => None,
        };

        let client_auth = match (client_cert_path, client_key_path) {
            (Some(cert_path), Some(key_path)) => {
                let cert = std::fs::read(cert_path).with_context(|| {
                    format!(
                        "failed to read MQTT TLS client cert '{}'",
                        cert_path.display()
                    )
                })?;
                let key = std::fs::read(key_path).with_context(|| {
                    format!(
                        "failed to read MQTT TLS client key '{}'",
                        key_path.display()
                    )
                })?;
                Some((cert, key))
            }
            (None, None) => None,
            (Some(_), None) => {
                return Err(anyhow!("MQTT TLS client certificate provided without key"))
            }
            (None, Some(_)) => {
                return Err(anyhow!("MQTT TLS client key provided without certificate"))
            }
        };

        Ok(Self { ca, client_auth })
    }

    pub fn is_configured(&self) -> bool {
        self.ca.is_some() || self.client_auth.is_some()
    }
}

/// Pick the rumqttc transport for `endpoint`.
pub fn build_transport(endpoint: &MqttEndpoint, materials: &TlsMaterials) -> Result<Transport> {
    if !endpoint.use_tls {
        if materials.is_configured() {
            return Err(anyhow!(
                "MQTT TLS materials provided but TLS is disabled.\n\
                 Use --mqtt-use-tls or mqtts:// scheme to enable TLS."
            ));
        }
        return Ok(Transport::tcp());
    }

    if !materials.is_configured() {
        return Ok(Transport::tls_with_default_config());
    }

    let ca = materials.ca.clone().ok_or_else(|| {
        anyhow!(
            "MQTT TLS CA certificate is required when providing client certificates.\n\
             Specify --mqtt-tls-ca-path or remove client cert configuration."
        )
    })?;
    Ok(Transport::tls(ca, materials.client_auth.clone(), None))
}
