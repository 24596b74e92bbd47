//! Resource descriptor resolution.
//!
//! The resource is built from two sets of attributes:
//! - detected: `OTEL_RESOURCE_ATTRIBUTES`, process facts and host facts
//! - static: service name and version from configuration
//!
//! Static attributes win when both sets carry the same key.

use opentelemetry::{Array, Key, KeyValue, StringValue, Value};
use opentelemetry_sdk::resource::{EnvResourceDetector, ResourceDetector};
use opentelemetry_sdk::Resource;
use std::time::Duration;

use crate::config::Config;

pub const SERVICE_NAME: Key = Key::from_static_str("service.name");
pub const SERVICE_VERSION: Key = Key::from_static_str("service.version");

const DETECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Detects attributes of the running process.
#[derive(Debug, Default)]
pub struct ProcessDetector;

impl ResourceDetector for ProcessDetector {
    fn detect(&self, _timeout: Duration) -> Resource {
        let mut attributes = vec![
            KeyValue::new("process.pid", i64::from(std::process::id())),
            KeyValue::new("process.runtime.name", "rust"),
        ];

        if let Ok(exe) = std::env::current_exe() {
            if let Some(name) = exe.file_name().and_then(|n| n.to_str()) {
                attributes.push(KeyValue::new("process.executable.name", name.to_string()));
            }
            attributes.push(KeyValue::new(
                "process.executable.path",
                exe.display().to_string(),
            ));
        }

        let args: Vec<StringValue> = std::env::args().map(StringValue::from).collect();
        attributes.push(KeyValue::new(
            "process.command_args",
            Value::Array(Array::from(args)),
        ));

        Resource::new(attributes)
    }
}

/// Detects attributes of the host machine.
#[derive(Debug, Default)]
pub struct HostDetector;

impl HostDetector {
    fn host_name() -> Option<String> {
        hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .filter(|name| !name.is_empty())
    }

    fn os_type() -> &'static str {
        match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        }
    }
}

impl ResourceDetector for HostDetector {
    fn detect(&self, _timeout: Duration) -> Resource {
        let mut attributes = vec![
            KeyValue::new("host.arch", std::env::consts::ARCH),
            KeyValue::new("os.type", Self::os_type()),
        ];
        if let Some(name) = Self::host_name() {
            attributes.push(KeyValue::new("host.name", name));
        }
        Resource::new(attributes)
    }
}

/// Attributes detected from the environment, the process and the host.
pub fn detected_resource() -> Resource {
    Resource::from_detectors(
        DETECT_TIMEOUT,
        vec![
            Box::new(EnvResourceDetector::new()),
            Box::new(ProcessDetector),
            Box::new(HostDetector),
        ],
    )
}

/// Statically configured service identity.
pub fn static_resource(config: &Config) -> Resource {
    Resource::new([
        KeyValue::new(SERVICE_NAME, config.client_name().to_string()),
        KeyValue::new(SERVICE_VERSION, config.service_version().to_string()),
    ])
}

/// Merge static attributes over detected ones.
pub fn merge_static(detected: &Resource, static_attrs: &Resource) -> Resource {
    // `merge` prefers the argument's value on conflicting keys.
    detected.merge(static_attrs)
}

/// Resolve the resource shared by the tracer and meter providers.
pub fn resolve_resource(config: &Config) -> Resource {
    merge_static(&detected_resource(), &static_resource(config))
}
