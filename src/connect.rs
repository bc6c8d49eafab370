//! Test-connection flow with default-password probing.
//!
//! When the supplied password is rejected, a short fixed list of common
//! defaults is tried in order. This is a convenience for freshly installed
//! servers, not a security mechanism, and the list is intentionally frozen.

use crate::error::{ErrorKind, Result};
use crate::rest_api::{AdminApi, AdminApiConnector, Connection, ServerInfo};
use std::sync::Arc;
use tracing::{info, warn};

pub const FALLBACK_PASSWORDS: [&str; 3] = ["123456", "admin", "password"];

/// Client that answered `get_server_info`, with the connection that worked.
pub struct Established {
    pub api: Arc<dyn AdminApi>,
    pub connection: Connection,
    pub info: ServerInfo,
    pub used_fallback: bool,
}

pub async fn probe_connection(
    connector: &dyn AdminApiConnector,
    connection: &Connection,
) -> Result<Established> {
    let err = match try_connect(connector, connection).await {
        Ok((api, info)) => {
            info!(host = %connection.host, port = connection.port, version = %info.version, "rest api connected");
            return Ok(Established {
                api,
                connection: connection.clone(),
                info,
                used_fallback: false,
            });
        }
        Err(err) => err,
    };

    if err.kind != ErrorKind::Unauthorized {
        return Err(err);
    }

    warn!("supplied admin password rejected, trying default passwords");
    let mut last_err = err;
    for candidate in FALLBACK_PASSWORDS {
        if candidate == connection.password {
            continue;
        }
        let attempt = connection.with_password(candidate);
        match try_connect(connector, &attempt).await {
            Ok((api, info)) => {
                info!(host = %attempt.host, port = attempt.port, "rest api connected with a default password");
                return Ok(Established {
                    api,
                    connection: attempt,
                    info,
                    used_fallback: true,
                });
            }
            Err(err) => last_err = err,
        }
    }
    Err(last_err)
}

async fn try_connect(
    connector: &dyn AdminApiConnector,
    connection: &Connection,
) -> Result<(Arc<dyn AdminApi>, ServerInfo)> {
    let api = connector.connect(connection)?;
    let payload = api.get_server_info().await?;
    let info = ServerInfo::from_payload(&payload).unwrap_or_default();
    Ok((api, info))
}
