//! Container runtime client.
//!
//! [`ContainerRuntime`] is the narrow surface the orchestrator needs from the
//! engine. [`DockerRuntime`] implements it over the local control socket with
//! bollard; tests substitute an in-memory fake.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use bollard::container::{
    InspectContainerOptions, ListContainersOptions, RemoveContainerOptions,
    RestartContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::image::{ListImagesOptions, RemoveImageOptions};
use bollard::volume::{ListVolumesOptions, RemoveVolumeOptions};
use bollard::Docker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use stackvo_core::{NetworkInfo, PortBinding};

use crate::error::RuntimeError;

/// Seconds the engine waits for a graceful stop before killing.
const STOP_TIMEOUT_SECS: i64 = 10;

/// One row of the container list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    /// Names as reported by the engine, usually with a leading `/`.
    pub names: Vec<String>,
    pub image: String,
    /// `running`, `exited`, `created`, ...
    pub state: String,
    pub created: Option<DateTime<Utc>>,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// The inspect fields the orchestrator reads.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContainerDetails {
    pub id: String,
    /// Image id the container was created from.
    pub image_id: Option<String>,
    pub network: NetworkInfo,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// All containers, running or not.
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError>;
    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails, RuntimeError>;
    async fn start_container(&self, name: &str) -> Result<(), RuntimeError>;
    async fn stop_container(&self, name: &str) -> Result<(), RuntimeError>;
    async fn restart_container(&self, name: &str) -> Result<(), RuntimeError>;
    async fn remove_container(&self, name: &str, force: bool) -> Result<(), RuntimeError>;
    /// Image ids whose reference matches `pattern` (`*redis*`).
    async fn list_images(&self, pattern: &str) -> Result<Vec<String>, RuntimeError>;
    async fn remove_image(&self, image: &str, force: bool) -> Result<(), RuntimeError>;
    /// Volume names containing `name_filter`.
    async fn list_volumes(&self, name_filter: &str) -> Result<Vec<String>, RuntimeError>;
    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError>;
}

// ---------------------------------------------------------------------------
// Docker
// ---------------------------------------------------------------------------

pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connect over the Unix socket at `socket`.
    ///
    /// The connection is lazy; an unreachable engine surfaces on first call.
    pub fn connect(socket: &Path) -> Result<Self, RuntimeError> {
        let path = socket.to_string_lossy();
        let client = Docker::connect_with_socket(&path, 120, bollard::API_DEFAULT_VERSION)
            .map_err(map_err)?;
        Ok(Self { client })
    }
}

fn map_err(err: bollard::errors::Error) -> RuntimeError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => RuntimeError::NotFound(message),
        other => RuntimeError::Api(other.to_string()),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let containers = self
            .client
            .list_containers(Some(options))
            .await
            .map_err(map_err)?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                names: c.names.unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                state: c.state.unwrap_or_default(),
                created: c.created.and_then(|ts| DateTime::from_timestamp(ts, 0)),
            })
            .collect())
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails, RuntimeError> {
        let inspect = self
            .client
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
            .map_err(map_err)?;

        let mut network = NetworkInfo::default();
        if let Some(settings) = inspect.network_settings {
            if let Some(ports) = settings.ports {
                let mut keys: Vec<_> = ports.into_iter().collect();
                keys.sort_by(|a, b| a.0.cmp(&b.0));
                network.ports = keys
                    .into_iter()
                    .map(|(container_port, bindings)| {
                        match bindings.and_then(|b| b.into_iter().next()) {
                            Some(binding) => PortBinding {
                                container_port,
                                host_ip: Some(
                                    binding
                                        .host_ip
                                        .filter(|ip| !ip.is_empty())
                                        .unwrap_or_else(|| "0.0.0.0".to_string()),
                                ),
                                host_port: binding.host_port,
                                exposed: true,
                            },
                            None => PortBinding {
                                container_port,
                                host_ip: None,
                                host_port: None,
                                exposed: false,
                            },
                        }
                    })
                    .collect();
            }

            let first_network = settings
                .networks
                .and_then(|nets| nets.into_iter().min_by(|a, b| a.0.cmp(&b.0)));
            network.ip_address = settings
                .ip_address
                .filter(|ip| !ip.is_empty())
                .or_else(|| {
                    first_network
                        .as_ref()
                        .and_then(|(_, n)| n.ip_address.clone())
                        .filter(|ip| !ip.is_empty())
                });
            network.gateway = settings
                .gateway
                .filter(|gw| !gw.is_empty())
                .or_else(|| {
                    first_network
                        .as_ref()
                        .and_then(|(_, n)| n.gateway.clone())
                        .filter(|gw| !gw.is_empty())
                });
            network.network = first_network.map(|(name, _)| name);
        }

        Ok(ContainerDetails {
            id: inspect.id.unwrap_or_default(),
            image_id: inspect.image,
            network,
        })
    }

    async fn start_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.client
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_err)
    }

    async fn stop_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.client
            .stop_container(name, Some(StopContainerOptions { t: STOP_TIMEOUT_SECS }))
            .await
            .map_err(map_err)
    }

    async fn restart_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.client
            .restart_container(
                name,
                Some(RestartContainerOptions {
                    t: STOP_TIMEOUT_SECS as isize,
                }),
            )
            .await
            .map_err(map_err)
    }

    async fn remove_container(&self, name: &str, force: bool) -> Result<(), RuntimeError> {
        self.client
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
            .map_err(map_err)
    }

    async fn list_images(&self, pattern: &str) -> Result<Vec<String>, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("reference".to_string(), vec![pattern.to_string()]);
        let images = self
            .client
            .list_images(Some(ListImagesOptions::<String> {
                filters,
                ..Default::default()
            }))
            .await
            .map_err(map_err)?;
        Ok(images
            .into_iter()
            .map(|img| img.repo_tags.into_iter().next().unwrap_or(img.id))
            .collect())
    }

    async fn remove_image(&self, image: &str, force: bool) -> Result<(), RuntimeError> {
        self.client
            .remove_image(
                image,
                Some(RemoveImageOptions {
                    force,
                    ..Default::default()
                }),
                None,
            )
            .await
            .map(|deleted| debug!(image, entries = deleted.len(), "image removed"))
            .map_err(map_err)
    }

    async fn list_volumes(&self, name_filter: &str) -> Result<Vec<String>, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![name_filter.to_string()]);
        let response = self
            .client
            .list_volumes(Some(ListVolumesOptions::<String> { filters }))
            .await
            .map_err(map_err)?;
        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|v| v.name)
            .collect())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.client
            .remove_volume(name, Some(RemoveVolumeOptions { force: true }))
            .await
            .map_err(map_err)
    }
}
