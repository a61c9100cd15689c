use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ration_kernel::{ManagerConfig, ResourceManager, ResourceManagerBuilder};
use ration_protocol::{Allocation, AllocationRequest, Priority, ResourceRange, ResourceType};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "rationd")]
#[command(about = "Resource allocation demo daemon")]
struct Cli {
    /// JSON manager config; a demo data-center pool is used when absent.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Release the first grant and negotiate the denied workloads again.
    #[arg(long)]
    release_first: bool,
    /// Print the final pool state and live allocations as JSON.
    #[arg(long)]
    json: bool,
}

struct Workload {
    name: &'static str,
    priority: Priority,
    compute: (u64, u64, u64),
    memory: (&'static str, &'static str, &'static str),
    gpu_memory: (&'static str, &'static str, &'static str),
}

static WORKLOADS: [Workload; 5] = [
    Workload {
        name: "deep-learning-trainer",
        priority: Priority::High,
        compute: (8, 16, 32),
        memory: ("32GB", "64GB", "128GB"),
        gpu_memory: ("16GB", "24GB", "32GB"),
    },
    Workload {
        name: "data-analyzer",
        priority: Priority::Medium,
        compute: (4, 8, 16),
        memory: ("16GB", "32GB", "64GB"),
        gpu_memory: ("4GB", "8GB", "16GB"),
    },
    Workload {
        name: "model-inference",
        priority: Priority::High,
        compute: (2, 4, 8),
        memory: ("8GB", "16GB", "32GB"),
        gpu_memory: ("2GB", "4GB", "8GB"),
    },
    Workload {
        name: "batch-processor",
        priority: Priority::Low,
        compute: (16, 24, 32),
        memory: ("64GB", "96GB", "128GB"),
        gpu_memory: ("8GB", "12GB", "16GB"),
    },
    Workload {
        name: "emergency-analysis",
        priority: Priority::Critical,
        compute: (4, 8, 16),
        memory: ("16GB", "32GB", "64GB"),
        gpu_memory: ("8GB", "16GB", "24GB"),
    },
];

impl Workload {
    fn request(&self) -> Result<AllocationRequest> {
        let (min, preferred, max) = self.compute;
        let compute = ResourceRange::new(min, preferred, max)?;
        let (min, preferred, max) = self.memory;
        let memory = ResourceRange::parse(min, preferred, max)?;
        let (min, preferred, max) = self.gpu_memory;
        let gpu_memory = ResourceRange::parse(min, preferred, max)?;
        Ok(AllocationRequest::new(self.priority)
            .with_resource(ResourceType::compute(), compute)
            .with_resource(ResourceType::memory(), memory)
            .with_resource(ResourceType::gpu_memory(), gpu_memory))
    }
}

fn demo_pool() -> ResourceManagerBuilder {
    ResourceManager::builder()
        .resource(ResourceType::compute(), 64)
        .resource(ResourceType::memory(), "256GB")
        .resource(ResourceType::gpu_memory(), "48GB")
        .resource(ResourceType::storage(), "10TB")
        .resource(ResourceType::bandwidth(), 10_000)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let cli = Cli::parse();

    let builder = match &cli.config {
        Some(path) => {
            let config = ManagerConfig::from_path(path)?;
            ResourceManagerBuilder::from_config(&config)
        }
        None => demo_pool(),
    };
    let manager = builder.build().context("failed to build resource manager")?;

    let mut events = manager.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let rendered = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_owned());
            info!(event = %rendered, "allocation.event");
        }
    });

    let mut granted: Vec<(&'static str, Allocation)> = Vec::new();
    let mut denied: Vec<&Workload> = Vec::new();
    for workload in &WORKLOADS {
        let request = workload
            .request()
            .with_context(|| format!("invalid request for workload {}", workload.name))?;
        match manager.allocate(&request) {
            Ok(allocation) => {
                info!(
                    workload = workload.name,
                    allocation_id = %allocation.allocation_id,
                    resources = ?allocation.resources,
                    "workload granted"
                );
                granted.push((workload.name, allocation));
            }
            Err(error) => {
                warn!(workload = workload.name, error = %error.to_payload(), "workload denied");
                denied.push(workload);
            }
        }
    }
    info!(granted = granted.len(), total = WORKLOADS.len(), "initial allocation round complete");

    if cli.release_first && !granted.is_empty() {
        let (name, allocation) = granted.remove(0);
        manager.release(&allocation)?;
        info!(workload = name, "released to make room");

        for workload in denied {
            let request = workload.request()?;
            match manager.negotiate_with_backoff(&request).await {
                Ok(allocation) => {
                    info!(workload = workload.name, resources = ?allocation.resources, "workload granted after reallocation");
                    granted.push((workload.name, allocation));
                }
                Err(error) => {
                    warn!(workload = workload.name, error = %error, "workload still denied");
                }
            }
        }
    }

    let capacity = manager.capacity();
    if cli.json {
        let allocations: Vec<_> = granted
            .iter()
            .map(|(name, allocation)| json!({ "workload": name, "allocation": allocation }))
            .collect();
        let report = json!({ "capacity": capacity, "allocations": allocations });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (resource, capacity) in &capacity {
            info!(
                resource = %resource,
                available = %capacity.available,
                total = %capacity.total,
                in_use = %capacity.in_use(),
                "pool utilization"
            );
        }
    }

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    event_task.abort();
    if let Err(error) = event_task.await
        && !error.is_cancelled()
    {
        warn!(%error, "event task stopped");
    }

    Ok(())
}
