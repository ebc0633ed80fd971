use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::FetchError;

/// Lifecycle stage of a scrap pickup order.
///
/// The set of stages and their order is closed: the declaration order below is the
/// lifecycle order and [`OrderStatus::index`] is the only source of ordering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum OrderStatus {
    Pending,   // La solicitud fue enviada y espera un dealer
    Assigned,  // Un dealer verificado tomó el pedido
    OnTheWay,  // El dealer está en camino
    Arrived,   // El dealer llegó al domicilio
    Verifying, // Se muestra el código de verificación al cliente
    Completed, // Retiro confirmado
}

impl OrderStatus {
    /// All stages, in lifecycle order.
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Assigned,
        OrderStatus::OnTheWay,
        OrderStatus::Arrived,
        OrderStatus::Verifying,
        OrderStatus::Completed,
    ];

    /// Position of the stage in the lifecycle, starting at 0 for `Pending`.
    pub fn index(self) -> usize {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Assigned => 1,
            OrderStatus::OnTheWay => 2,
            OrderStatus::Arrived => 3,
            OrderStatus::Verifying => 4,
            OrderStatus::Completed => 5,
        }
    }

    /// Wire name of the stage.
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Assigned => "assigned",
            OrderStatus::OnTheWay => "on_the_way",
            OrderStatus::Arrived => "arrived",
            OrderStatus::Verifying => "verifying",
            OrderStatus::Completed => "completed",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Order Submitted",
            OrderStatus::Assigned => "Assigned to Dealer",
            OrderStatus::OnTheWay => "On the Way",
            OrderStatus::Arrived => "Arrived",
            OrderStatus::Verifying => "OTP Verification",
            OrderStatus::Completed => "Completed",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Your scrap pickup request has been submitted",
            OrderStatus::Assigned => "Your order is assigned to a verified scrap dealer",
            OrderStatus::OnTheWay => {
                "The scrapper is on the way. Please wait until they reach your doorstep."
            }
            OrderStatus::Arrived => "The scrapper has reached your location",
            OrderStatus::Verifying => "Share this OTP with the scrapper to verify pickup",
            OrderStatus::Completed => "Pickup completed! Thank you for recycling",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| FetchError::Malformed(format!("unknown order status '{}'", s)))
    }
}

impl TryFrom<String> for OrderStatus {
    type Error = FetchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
