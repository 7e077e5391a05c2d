//! Device identity used to populate the login message.

/// Client version reported in the login message
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Source of the device descriptor and client version sent at login
pub trait DeviceInfo: Send + Sync {
    /// Human-readable device descriptor
    fn descriptor(&self) -> String;

    /// Protocol/client version string
    fn client_version(&self) -> String {
        CLIENT_VERSION.to_string()
    }
}

/// Describes the machine this process runs on
#[derive(Debug, Clone, Default)]
pub struct HostDeviceInfo;

impl DeviceInfo for HostDeviceInfo {
    fn descriptor(&self) -> String {
        let host = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_else(|_| "unknown-host".to_string());
        format!("{}({} {})", host, std::env::consts::OS, std::env::consts::ARCH)
    }
}

/// Fixed descriptor, e.g. from a command-line flag
#[derive(Debug, Clone)]
pub struct StaticDeviceInfo {
    name: String,
}

impl StaticDeviceInfo {
    /// Use `name` as the device descriptor
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl DeviceInfo for StaticDeviceInfo {
    fn descriptor(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_descriptor_names_platform() {
        let descriptor = HostDeviceInfo.descriptor();
        assert!(descriptor.contains(std::env::consts::OS));
        assert_eq!(HostDeviceInfo.client_version(), CLIENT_VERSION);
    }
}
