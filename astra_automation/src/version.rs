use std::fmt;
use std::str::FromStr;

/// Four-part ASTRA build number, ordered component by component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AstraVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

impl AstraVersion {
    pub const fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }
}

/// Oldest host this client is tested against.
pub const MIN_SUPPORTED: AstraVersion = AstraVersion::new(8, 1, 0, 0);
/// First host that raises read/write events and acknowledges recomputes with a run event.
pub const READ_WRITE_EVENTS: AstraVersion = AstraVersion::new(8, 1, 1, 0);
/// First host that accepts a collection duration of -1 (collect until stopped).
pub const INDEFINITE_COLLECTION: AstraVersion = AstraVersion::new(8, 2, 0, 105);
/// First host that honours automatic peak finding.
pub const AUTOFIND_PEAKS: AstraVersion = AstraVersion::new(8, 2, 0, 117);

impl fmt::Display for AstraVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl FromStr for AstraVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = [0u32; 4];
        let mut count = 0;
        for piece in s.trim().split('.') {
            if count == parts.len() {
                return Err(format!("too many components in version {s:?}"));
            }
            parts[count] = piece
                .parse()
                .map_err(|_| format!("invalid version component {piece:?} in {s:?}"))?;
            count += 1;
        }
        Ok(AstraVersion::new(parts[0], parts[1], parts[2], parts[3]))
    }
}
