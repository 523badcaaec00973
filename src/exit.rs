use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Why an actor stopped.
///
/// `Normal`, `Shutdown` and `Cancelled` are the orderly reasons; a
/// `Transient` child that exits with one of them is left stopped.
#[derive(Clone, Default)]
pub enum ExitReason {
	#[default]
	Normal,
	Shutdown,
	Cancelled,
	Killed,
	Timeout,
	Panic(Arc<str>),
	Error(Arc<anyhow::Error>),
}

impl ExitReason {
	pub fn error(err: impl Into<anyhow::Error>) -> Self {
		ExitReason::Error(Arc::new(err.into()))
	}

	pub fn msg(msg: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
		ExitReason::Error(Arc::new(anyhow::Error::msg(msg)))
	}

	pub(crate) fn panic(payload: Box<dyn Any + Send>) -> Self {
		let text: Arc<str> = if let Some(s) = payload.downcast_ref::<&'static str>() {
			Arc::from(*s)
		} else if let Some(s) = payload.downcast_ref::<String>() {
			Arc::from(s.as_str())
		} else {
			Arc::from("opaque panic payload")
		};
		ExitReason::Panic(text)
	}

	pub fn is_normal(&self) -> bool {
		matches!(
			self,
			ExitReason::Normal | ExitReason::Shutdown | ExitReason::Cancelled
		)
	}

	pub fn is_abnormal(&self) -> bool {
		!self.is_normal()
	}

	/// Looks through an `Error` reason for a concrete error type.
	pub fn downcast_ref<E>(&self) -> Option<&E>
	where
		E: fmt::Display + fmt::Debug + Send + Sync + 'static,
	{
		match self {
			ExitReason::Error(err) => err.downcast_ref::<E>(),
			_ => None,
		}
	}

	/// Short label used for metrics.
	pub(crate) fn label(&self) -> &'static str {
		match self {
			ExitReason::Normal => "normal",
			ExitReason::Shutdown => "shutdown",
			ExitReason::Cancelled => "cancelled",
			ExitReason::Killed => "killed",
			ExitReason::Timeout => "timeout",
			ExitReason::Panic(_) => "panic",
			ExitReason::Error(_) => "error",
		}
	}
}

impl fmt::Display for ExitReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ExitReason::Panic(msg) => write!(f, "panic: {msg}"),
			ExitReason::Error(err) => write!(f, "error: {err:#}"),
			other => f.write_str(other.label()),
		}
	}
}

impl fmt::Debug for ExitReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ExitReason::Panic(msg) => f.debug_tuple("Panic").field(msg).finish(),
			ExitReason::Error(err) => f.debug_tuple("Error").field(&format_args!("{err:#}")).finish(),
			other => f.write_str(match other {
				ExitReason::Normal => "Normal",
				ExitReason::Shutdown => "Shutdown",
				ExitReason::Cancelled => "Cancelled",
				ExitReason::Killed => "Killed",
				_ => "Timeout",
			}),
		}
	}
}

impl std::error::Error for ExitReason {}

impl From<anyhow::Error> for ExitReason {
	fn from(err: anyhow::Error) -> Self {
		ExitReason::Error(Arc::new(err))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ActorError;

	#[test]
	fn orderly_reasons_are_not_abnormal() {
		assert!(ExitReason::Normal.is_normal());
		assert!(ExitReason::Shutdown.is_normal());
		assert!(ExitReason::Cancelled.is_normal());
		assert!(ExitReason::Killed.is_abnormal());
		assert!(ExitReason::msg("boom").is_abnormal());
	}

	#[test]
	fn error_reason_downcasts_to_source() {
		let reason = ExitReason::error(ActorError::Unhandled);
		assert!(matches!(
			reason.downcast_ref::<ActorError>(),
			Some(ActorError::Unhandled)
		));
		assert!(ExitReason::Normal.downcast_ref::<ActorError>().is_none());
	}

	#[test]
	fn panic_payload_is_kept_as_text() {
		let reason = ExitReason::panic(Box::new("bad state"));
		assert_eq!(reason.to_string(), "panic: bad state");
	}
}
