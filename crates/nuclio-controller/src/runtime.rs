// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for nuclio-controller.
//!
//! [`ControllerRuntime`] compiles every declared function, starts one
//! reconcile loop per function and, optionally, the admin HTTP API.
//!
//! ```rust,ignore
//! use nuclio_controller::config::Config;
//! use nuclio_controller::manifest::Manifest;
//! use nuclio_controller::runtime::ControllerRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let manifest = Manifest::load(&config.functions_file)?;
//!
//!     let runtime = ControllerRuntime::builder()
//!         .config(config)
//!         .functions(manifest.functions)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... run your application ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use nuclio_api::{ControlPlane, HttpControlPlane};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::admin::{AppState, ManagedFunction, build_router};
use crate::compiler::{CompileDefaults, EnvSecretResolver, RawFunctionConfig, SecretResolver, compile};
use crate::config::Config;
use crate::controller::FunctionController;
use crate::gateway::InvocationGateway;

/// Builder for creating a [`ControllerRuntime`].
pub struct ControllerRuntimeBuilder {
    config: Config,
    functions: Vec<RawFunctionConfig>,
    backend: Option<Arc<dyn ControlPlane>>,
    secrets: Arc<dyn SecretResolver>,
    serve_admin: bool,
}

impl Default for ControllerRuntimeBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            functions: Vec::new(),
            backend: None,
            secrets: Arc::new(EnvSecretResolver),
            serve_admin: true,
        }
    }
}

impl ControllerRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the controller configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the declared functions.
    pub fn functions(mut self, functions: Vec<RawFunctionConfig>) -> Self {
        self.functions = functions;
        self
    }

    /// Use one control plane for every function instead of an HTTP client
    /// per address.
    pub fn backend(mut self, backend: Arc<dyn ControlPlane>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the secret resolver.
    ///
    /// Default: environment variables.
    pub fn secret_resolver(mut self, resolver: Arc<dyn SecretResolver>) -> Self {
        self.secrets = resolver;
        self
    }

    /// Start the admin HTTP API on `config.admin_addr`.
    ///
    /// Default: `true`
    pub fn serve_admin(mut self, serve: bool) -> Self {
        self.serve_admin = serve;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if a function is declared twice.
    pub fn build(self) -> Result<ControllerRuntimeConfig> {
        let mut names = std::collections::HashSet::new();
        for function in &self.functions {
            let name = function.name.trim();
            if !name.is_empty() && !names.insert(name) {
                anyhow::bail!("function {} is declared twice", name);
            }
        }

        Ok(ControllerRuntimeConfig {
            config: self.config,
            functions: self.functions,
            backend: self.backend,
            secrets: self.secrets,
            serve_admin: self.serve_admin,
        })
    }
}

/// Configuration for a [`ControllerRuntime`].
pub struct ControllerRuntimeConfig {
    config: Config,
    functions: Vec<RawFunctionConfig>,
    backend: Option<Arc<dyn ControlPlane>>,
    secrets: Arc<dyn SecretResolver>,
    serve_admin: bool,
}

impl ControllerRuntimeConfig {
    /// Compile the functions and start their loops and the admin API.
    pub async fn start(self) -> Result<ControllerRuntime> {
        let defaults = CompileDefaults::from(&self.config);
        let invoke_client = reqwest::Client::builder().build()?;
        let mut backends: HashMap<String, Arc<dyn ControlPlane>> = HashMap::new();

        let mut functions = Vec::with_capacity(self.functions.len());
        for raw in &self.functions {
            let controller = match compile(raw, &defaults, self.secrets.as_ref()) {
                Ok(spec) => {
                    let backend = match &self.backend {
                        Some(backend) => backend.clone(),
                        None => match backends.get(&spec.address) {
                            Some(backend) => backend.clone(),
                            None => {
                                let client: Arc<dyn ControlPlane> = Arc::new(HttpControlPlane::new(
                                    self.config.client_config(&spec.address),
                                )?);
                                backends.insert(spec.address.clone(), client.clone());
                                client
                            }
                        },
                    };
                    FunctionController::new(spec, backend)
                }
                Err(e) => FunctionController::broken(raw.name.trim(), e.to_string()),
            };

            let gateway = Arc::new(InvocationGateway::with_defaults(
                controller.clone(),
                raw.invoke.clone(),
                invoke_client.clone(),
                self.config.max_in_flight,
                self.config.invocation_timeout,
            ));
            functions.push(ManagedFunction {
                controller,
                gateway,
            });
        }

        let loop_handles = functions
            .iter()
            .map(|f| tokio::spawn(f.controller.clone().run()))
            .collect();

        let shutdown = CancellationToken::new();
        let (server_handle, admin_addr) = if self.serve_admin {
            let listener = tokio::net::TcpListener::bind(self.config.admin_addr).await?;
            let addr = listener.local_addr()?;
            let router = build_router(AppState::new(functions.iter().cloned()));
            let token = shutdown.clone();
            let handle = tokio::spawn(async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(token.cancelled_owned())
                    .await?;
                Ok::<(), anyhow::Error>(())
            });
            (Some(handle), Some(addr))
        } else {
            (None, None)
        };

        info!(
            functions = functions.len(),
            admin_addr = ?admin_addr,
            "ControllerRuntime started"
        );

        Ok(ControllerRuntime {
            functions,
            loop_handles,
            server_handle,
            shutdown,
            admin_addr,
        })
    }
}

/// A running set of function controllers.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct ControllerRuntime {
    functions: Vec<ManagedFunction>,
    loop_handles: Vec<JoinHandle<()>>,
    server_handle: Option<JoinHandle<Result<()>>>,
    shutdown: CancellationToken,
    admin_addr: Option<SocketAddr>,
}

impl ControllerRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> ControllerRuntimeBuilder {
        ControllerRuntimeBuilder::new()
    }

    /// Bound address of the admin API, if served.
    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    /// Managed functions, in manifest order.
    pub fn functions(&self) -> &[ManagedFunction] {
        &self.functions
    }

    /// Look up a function by name.
    pub fn function(&self, name: &str) -> Option<&ManagedFunction> {
        self.functions.iter().find(|f| f.controller.name() == name)
    }

    /// Check if the runtime has not been shut down and the admin API is up.
    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
            && self.server_handle.as_ref().is_none_or(|h| !h.is_finished())
    }

    /// Close every controller, stop the admin API and wait for both.
    pub async fn shutdown(self) -> Result<()> {
        info!("ControllerRuntime shutting down...");

        for function in &self.functions {
            function.controller.close();
        }
        self.shutdown.cancel();

        for handle in self.loop_handles {
            if let Err(e) = handle.await {
                error!("Reconcile loop task panicked: {}", e);
            }
        }

        match self.server_handle {
            None => {}
            Some(handle) => match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Admin server error during shutdown: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    error!("Admin server task panicked: {}", e);
                    return Err(anyhow::anyhow!("admin server task panicked: {}", e));
                }
            },
        }

        info!("ControllerRuntime shutdown complete");
        Ok(())
    }
}
