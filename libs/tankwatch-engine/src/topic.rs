use crate::error::DispatchError;

/// Borrowed view of `<namespace>/<tank>/<sensor>[/...]`.
///
/// Segments past the third are ignored; the rate limiter still keys on the
/// full topic string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorTopic<'a> {
    pub namespace: &'a str,
    pub tank: &'a str,
    pub sensor: &'a str,
}

impl<'a> SensorTopic<'a> {
    pub fn parse(topic: &'a str) -> Result<Self, DispatchError> {
        let mut segments = topic.split('/');
        match (segments.next(), segments.next(), segments.next()) {
            (Some(namespace), Some(tank), Some(sensor))
                if !tank.is_empty() && !sensor.is_empty() =>
            {
                Ok(Self { namespace, tank, sensor })
            }
            _ => Err(DispatchError::MalformedTopic {
                topic: topic.to_string(),
            }),
        }
    }
}
