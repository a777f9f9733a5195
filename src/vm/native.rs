//! Built-in native functions.

use std::time::{SystemTime, UNIX_EPOCH};

use super::object::NativeFn;
use super::Value;

/// Natives installed into every new VM: (name, arity, function).
pub const BUILTINS: &[(&str, u8, NativeFn)] = &[("clock", 0, clock)];

/// Seconds since the Unix epoch, with millisecond precision.
pub fn clock(_args: &[Value]) -> Result<Value, String> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| format!("clock error: {}", e))?;
    Ok(Value::Number(elapsed.as_millis() as f64 / 1000.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_returns_seconds() {
        let now = clock(&[]).unwrap().as_number().unwrap();
        // Some time after 2020-01-01.
        assert!(now > 1_577_836_800.0);
    }
}
