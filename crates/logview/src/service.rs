//! D-Bus surface of the gateway.
//!
//! Method names follow the interface the desktop client already speaks.
//! Only authorization failures reach the caller as D-Bus errors; every
//! other failure collapses to the method's empty, false, 0 or -1 reply.

use logview_protocol::defaults::{OBJECT_PATH, READ_REJECTED_REPLY, SERVICE_NAME};
use logview_protocol::{BusKind, GatewayError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};
use zbus::message::Header;
use zbus::Connection;

use crate::gateway::Gateway;

/// Errors sent back over the bus.
#[derive(Debug, zbus::DBusError)]
#[zbus(prefix = "com.deepin.logviewer.Error")]
pub enum ServiceError {
    #[zbus(error)]
    ZBus(zbus::Error),
    /// Caller is not the trusted client; message names its pid and path.
    AuthorizationDenied(String),
}

impl From<zbus::fdo::Error> for ServiceError {
    fn from(err: zbus::fdo::Error) -> Self {
        Self::ZBus(err.into())
    }
}

pub struct LogViewerService {
    gateway: Arc<Gateway>,
    shutdown: Arc<Notify>,
}

impl LogViewerService {
    pub fn new(gateway: Arc<Gateway>, shutdown: Arc<Notify>) -> Self {
        Self { gateway, shutdown }
    }

    /// Run `op` for the calling peer on the blocking pool.
    async fn call<T, F>(
        &self,
        header: &Header<'_>,
        conn: &Connection,
        op: F,
    ) -> Result<logview_protocol::Result<T>, ServiceError>
    where
        T: Send + 'static,
        F: FnOnce(&Gateway, u32) -> logview_protocol::Result<T> + Send + 'static,
    {
        let pid = caller_pid(header, conn).await?;
        let gateway = Arc::clone(&self.gateway);
        let result = tokio::task::spawn_blocking(move || op(&gateway, pid))
            .await
            .map_err(|err| ServiceError::ZBus(zbus::Error::Failure(format!("worker task failed: {}", err))))?;
        match result {
            Err(err @ GatewayError::AuthorizationDenied { .. }) => {
                Err(ServiceError::AuthorizationDenied(err.to_string()))
            }
            other => Ok(other),
        }
    }
}

/// Collapse a non-authorization failure to the method's fallback reply.
fn or_default<T>(method: &str, result: logview_protocol::Result<T>, fallback: T) -> T {
    result.unwrap_or_else(|err| {
        debug!(method, error = %err, "Request failed");
        fallback
    })
}

fn path_strings(paths: Vec<PathBuf>) -> Vec<String> {
    paths
        .into_iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect()
}

async fn caller_pid(header: &Header<'_>, conn: &Connection) -> Result<u32, ServiceError> {
    let Some(sender) = header.sender() else {
        warn!("Message without sender");
        return Err(ServiceError::AuthorizationDenied(
            GatewayError::AuthorizationDenied {
                pid: 0,
                path: String::new(),
            }
            .to_string(),
        ));
    };
    let proxy = zbus::fdo::DBusProxy::new(conn).await.map_err(ServiceError::ZBus)?;
    Ok(proxy
        .get_connection_unix_process_id(sender.clone().into())
        .await?)
}

#[zbus::interface(name = "com.deepin.logviewer")]
impl LogViewerService {
    #[zbus(name = "readLog")]
    async fn read_log(
        &self,
        file_path: String,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] conn: &Connection,
    ) -> Result<String, ServiceError> {
        let result = self
            .call(&header, conn, move |g, pid| g.read_log(pid, &file_path))
            .await?;
        Ok(match result {
            Ok(text) => text,
            Err(GatewayError::PolicyRejected(reason)) => {
                debug!(reason, "readLog rejected");
                READ_REJECTED_REPLY.to_string()
            }
            Err(err) => or_default("readLog", Err(err), String::new()),
        })
    }

    #[zbus(name = "readLogLinesInRange")]
    async fn read_log_lines_in_range(
        &self,
        file_path: String,
        start_line: i64,
        line_count: i64,
        reverse: bool,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] conn: &Connection,
    ) -> Result<Vec<String>, ServiceError> {
        let (start, count) = (start_line.max(0) as u64, line_count.max(0) as u64);
        let result = self
            .call(&header, conn, move |g, pid| {
                g.read_range(pid, &file_path, start, count, reverse)
            })
            .await?;
        Ok(or_default("readLogLinesInRange", result, Vec::new()))
    }

    #[zbus(name = "getLineCount")]
    async fn get_line_count(
        &self,
        file_path: String,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] conn: &Connection,
    ) -> Result<i64, ServiceError> {
        let result = self
            .call(&header, conn, move |g, pid| g.line_count(pid, &file_path))
            .await?;
        Ok(or_default("getLineCount", result.map(|n| n as i64), -1))
    }

    #[zbus(name = "getFileSize")]
    async fn get_file_size(
        &self,
        file_path: String,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] conn: &Connection,
    ) -> Result<u64, ServiceError> {
        let result = self
            .call(&header, conn, move |g, pid| g.file_size(pid, &file_path))
            .await?;
        Ok(or_default("getFileSize", result, 0))
    }

    #[zbus(name = "isFileExist")]
    async fn is_file_exist(
        &self,
        file_path: String,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] conn: &Connection,
    ) -> Result<bool, ServiceError> {
        let result = self
            .call(&header, conn, move |g, pid| g.file_exists(pid, &file_path))
            .await?;
        Ok(or_default("isFileExist", result, false))
    }

    #[zbus(name = "openLogStream")]
    async fn open_log_stream(
        &self,
        file_path: String,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] conn: &Connection,
    ) -> Result<String, ServiceError> {
        let result = self
            .call(&header, conn, move |g, pid| g.open_stream(pid, &file_path))
            .await?;
        Ok(or_default("openLogStream", result, String::new()))
    }

    #[zbus(name = "readLogInStream")]
    async fn read_log_in_stream(
        &self,
        token: String,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] conn: &Connection,
    ) -> Result<String, ServiceError> {
        let result = self
            .call(&header, conn, move |g, pid| g.read_stream_chunk(pid, &token))
            .await?;
        Ok(or_default("readLogInStream", result, String::new()))
    }

    #[zbus(name = "getFileInfo")]
    async fn get_file_info(
        &self,
        category: String,
        unzip: bool,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] conn: &Connection,
    ) -> Result<Vec<String>, ServiceError> {
        let result = self
            .call(&header, conn, move |g, pid| g.resolve_sources(pid, &category, unzip))
            .await?;
        Ok(path_strings(or_default("getFileInfo", result, Vec::new())))
    }

    #[zbus(name = "getOtherFileInfo")]
    async fn get_other_file_info(
        &self,
        file_path: String,
        unzip: bool,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] conn: &Connection,
    ) -> Result<Vec<String>, ServiceError> {
        let result = self
            .call(&header, conn, move |g, pid| {
                g.resolve_other_sources(pid, &file_path, unzip)
            })
            .await?;
        Ok(path_strings(or_default("getOtherFileInfo", result, Vec::new())))
    }

    #[zbus(name = "exportLog")]
    async fn export_log(
        &self,
        out_dir: String,
        source: String,
        is_file: bool,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] conn: &Connection,
    ) -> Result<bool, ServiceError> {
        let result = self
            .call(&header, conn, move |g, pid| g.export(pid, &out_dir, &source, is_file))
            .await?;
        Ok(or_default("exportLog", result.map(|_| true), false))
    }

    #[zbus(name = "executeCmd")]
    async fn execute_cmd(
        &self,
        key: String,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] conn: &Connection,
    ) -> Result<String, ServiceError> {
        let result = self
            .call(&header, conn, move |g, pid| g.run_diagnostic(pid, &key))
            .await?;
        Ok(or_default("executeCmd", result, String::new()))
    }

    #[zbus(name = "whiteListOutPaths")]
    async fn white_list_out_paths(
        &self,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] conn: &Connection,
    ) -> Result<Vec<String>, ServiceError> {
        let result = self
            .call(&header, conn, |g, pid| g.whitelist_paths(pid))
            .await?;
        Ok(path_strings(or_default("whiteListOutPaths", result, Vec::new())))
    }

    #[zbus(name = "exitCode")]
    async fn exit_code(
        &self,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] conn: &Connection,
    ) -> Result<i32, ServiceError> {
        let result = self.call(&header, conn, |g, pid| g.exit_code(pid)).await?;
        Ok(or_default("exitCode", result, -1))
    }

    #[zbus(name = "quit")]
    async fn quit(
        &self,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] conn: &Connection,
    ) -> Result<(), ServiceError> {
        self.call(&header, conn, |g, pid| g.authorize_quit(pid))
            .await?
            .map_err(|err| ServiceError::ZBus(zbus::Error::Failure(err.to_string())))?;
        self.shutdown.notify_one();
        Ok(())
    }
}

/// Claim the well-known name and serve the gateway on `bus`.
pub async fn serve(bus: BusKind, service: LogViewerService) -> zbus::Result<Connection> {
    let builder = match bus {
        BusKind::System => zbus::connection::Builder::system()?,
        BusKind::Session => zbus::connection::Builder::session()?,
    };
    builder
        .name(SERVICE_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
}
