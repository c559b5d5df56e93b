//! Weather-specific error types.

use skyboard_core::{AppError, NetworkError, ReqwestErrorExt};
use thiserror::Error;

/// Failure of a provider call or of a fetch built on top of one.
///
/// `Clone` so one coalesced outcome can be handed to every waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeatherError {
    /// Transport failure or non-2xx response
    #[error("Provider error{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Provider {
        status: Option<u16>,
        message: String,
    },

    /// The provider understood the request but knows no such location
    #[error("Location not found: {0}")]
    NotFound(String),

    /// Response body did not have the expected shape
    #[error("Parse error: {0}")]
    Parse(String),
}

impl WeatherError {
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            status: None,
            message: message.into(),
        }
    }

    /// Message for the dashboard's error slot.
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider {
                status: Some(401), ..
            } => "Weather API key is invalid. Check settings.".to_string(),
            Self::Provider {
                status: Some(429), ..
            } => "Weather service rate limit reached. Please wait a minute.".to_string(),
            Self::Provider { message, .. } if !message.is_empty() => {
                format!("Failed to fetch weather data: {}", message)
            }
            Self::Provider { .. } => "Failed to fetch weather data".to_string(),
            Self::NotFound(city) => format!("City not found: {}", city),
            Self::Parse(_) => "Received unexpected weather data".to_string(),
        }
    }
}

impl From<reqwest::Error> for WeatherError {
    fn from(e: reqwest::Error) -> Self {
        match e.into_network_error() {
            NetworkError::ServerError { status, message } => Self::Provider {
                status: Some(status),
                message,
            },
            NetworkError::InvalidResponse(message) => Self::Parse(message),
            other => Self::provider(other.to_string()),
        }
    }
}

impl From<WeatherError> for AppError {
    fn from(e: WeatherError) -> Self {
        match e {
            WeatherError::Provider {
                status: Some(401), ..
            } => AppError::Weather(skyboard_core::WeatherError::InvalidApiKey),
            WeatherError::Provider {
                status: Some(status),
                message,
            } => AppError::Network(NetworkError::ServerError { status, message }),
            WeatherError::Provider {
                status: None,
                message,
            } => AppError::Weather(skyboard_core::WeatherError::ApiError(message)),
            WeatherError::NotFound(city) => {
                AppError::Weather(skyboard_core::WeatherError::LocationNotFound(city))
            }
            WeatherError::Parse(message) => {
                AppError::Weather(skyboard_core::WeatherError::Malformed(message))
            }
        }
    }
}
