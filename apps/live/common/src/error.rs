use entity::RtcRole;
use std::fmt;
use thiserror::Error;

/// Hardware device a media error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Camera,
    Microphone,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Camera => write!(f, "camera"),
            Device::Microphone => write!(f, "microphone"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Permission to use the {0} was denied")]
    PermissionDenied(Device),

    #[error("No {0} was found")]
    DeviceNotFound(Device),

    #[error("The {0} is already in use")]
    DeviceInUse(Device),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Token issued for {token:?} cannot be used to join as {requested:?}")]
    RoleMismatch { requested: RtcRole, token: RtcRole },

    #[error("RTC error: {0}")]
    Rtc(String),
}

impl MediaError {
    /// Maps a getUserMedia-style error name onto the hardware taxonomy.
    pub fn classify(device: Device, name: &str, message: &str) -> Self {
        match name {
            "NotAllowedError" | "PermissionDeniedError" | "PERMISSION_DENIED" => {
                MediaError::PermissionDenied(device)
            }
            "NotFoundError" | "DevicesNotFoundError" | "DEVICE_NOT_FOUND" => {
                MediaError::DeviceNotFound(device)
            }
            "NotReadableError" | "TrackStartError" | "NOT_READABLE" => {
                MediaError::DeviceInUse(device)
            }
            _ => MediaError::Device(format!("{} ({}): {}", device, name, message)),
        }
    }

    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            MediaError::PermissionDenied(_)
                | MediaError::DeviceNotFound(_)
                | MediaError::DeviceInUse(_)
                | MediaError::Device(_)
        )
    }

    /// User-facing remediation text.
    pub fn remediation(&self) -> &'static str {
        match self {
            MediaError::PermissionDenied(_) => {
                "Allow camera and microphone access in your browser settings, then try again."
            }
            MediaError::DeviceNotFound(_) => {
                "Connect a camera and microphone, then try again."
            }
            MediaError::DeviceInUse(_) => {
                "Close other applications using your camera or microphone, then try again."
            }
            MediaError::Device(_) => "Your camera or microphone could not be started.",
            MediaError::RoleMismatch { .. } => "Could not join the stream with this role.",
            MediaError::Rtc(_) => "The live connection failed. Please try again.",
        }
    }
}
