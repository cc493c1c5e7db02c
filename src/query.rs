use skycast_core::{Outcome, ServiceError};

/// Longest address accepted, in characters, after whitespace is collapsed.
pub const MAX_ADDRESS_CHARS: usize = 255;

const OMISSION: &str = "...";

/// Normalized inbound address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastQuery {
    address: String,
}

impl ForecastQuery {
    /// Normalize `raw` and reject it if nothing usable is left.
    pub fn parse(raw: &str) -> Outcome<Self> {
        let address = normalize(raw);
        if address.trim().is_empty() {
            return Err(
                ServiceError::invalid_field("Address can't be blank", "address", None)
                    .with_status_code(422),
            );
        }
        Ok(Self { address })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

/// Trim, collapse whitespace runs, cap the length, then drop anything that
/// is not alphanumeric, whitespace, `,`, `.` or `-`.
fn normalize(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let capped = if collapsed.chars().count() > MAX_ADDRESS_CHARS {
        let keep = MAX_ADDRESS_CHARS - OMISSION.len();
        let mut s: String = collapsed.chars().take(keep).collect();
        s.push_str(OMISSION);
        s
    } else {
        collapsed
    };

    capped
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || matches!(c, ',' | '.' | '-'))
        .collect()
}
