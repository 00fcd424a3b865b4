//! ---
//! rc_section: "02-messaging"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Delivery guarantees and their MQTT QoS mapping."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
use rumqttc::QoS;

use crate::MessagingError;

/// Delivery guarantees requested from the broker for outbound frames.
///
/// None of them implies an application-level acknowledgement: the harness
/// never learns whether the platform processed a specific frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryGuarantee {
    /// Fire and forget; the broker may drop the frame.
    AtMostOnce,
    /// Redelivered until the broker acknowledges; duplicates are possible.
    #[default]
    AtLeastOnce,
    /// Broker-side deduplicated delivery.
    ExactlyOnce,
}

impl DeliveryGuarantee {
    /// Numeric MQTT QoS level.
    pub fn level(&self) -> u8 {
        match self {
            DeliveryGuarantee::AtMostOnce => 0,
            DeliveryGuarantee::AtLeastOnce => 1,
            DeliveryGuarantee::ExactlyOnce => 2,
        }
    }

    pub fn to_mqtt(self) -> QoS {
        match self {
            DeliveryGuarantee::AtMostOnce => QoS::AtMostOnce,
            DeliveryGuarantee::AtLeastOnce => QoS::AtLeastOnce,
            DeliveryGuarantee::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

impl TryFrom<u8> for DeliveryGuarantee {
    type Error = MessagingError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(DeliveryGuarantee::AtMostOnce),
            1 => Ok(DeliveryGuarantee::AtLeastOnce),
            2 => Ok(DeliveryGuarantee::ExactlyOnce),
            other => Err(MessagingError::InvalidQos(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_at_least_once() {
        assert_eq!(DeliveryGuarantee::default().to_mqtt(), QoS::AtLeastOnce);
    }

    #[test]
    fn numeric_levels_map_both_ways() {
        for level in 0..=2u8 {
            let guarantee = DeliveryGuarantee::try_from(level).expect("valid level");
            assert_eq!(guarantee.level(), level);
        }
        assert!(matches!(
            DeliveryGuarantee::try_from(3),
            Err(MessagingError::InvalidQos(3))
        ));
    }
}
