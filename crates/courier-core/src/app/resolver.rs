//! Operation resolver - channel + direction → declared operation.

use crate::domain::errors::CourierError;
use crate::domain::schema::PayloadType;
use crate::domain::spec::{Direction, Operation, Specification, operation_for};

/// Look up the operation declared for `direction` on `channel_id`.
///
/// - unknown channel: `InvalidChannel`
/// - channel without that side: `OperationNotDeclared { direction }`
pub fn resolve<'a>(
    spec: &'a Specification,
    channel_id: &str,
    direction: Direction,
) -> Result<&'a Operation, CourierError> {
    let channel = spec
        .channel(channel_id)
        .ok_or_else(|| CourierError::InvalidChannel(channel_id.to_string()))?;

    operation_for(channel, direction).ok_or_else(|| CourierError::OperationNotDeclared {
        channel_id: channel_id.to_string(),
        direction,
    })
}

/// Declared payload type for `direction` on `channel_id`.
///
/// `Ok(None)` when the operation has no message, or a message without a type.
pub fn payload_type<'a>(
    spec: &'a Specification,
    channel_id: &str,
    direction: Direction,
) -> Result<Option<&'a PayloadType>, CourierError> {
    Ok(resolve(spec, channel_id, direction)?.payload_type())
}
