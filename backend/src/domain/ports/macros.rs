//! Helper macro for declaring port error enums.
//!
//! Each variant names the domain [`ErrorCode`](crate::domain::ErrorCode) it
//! maps to, so services can lift adapter failures with `?` at the operation
//! boundary.

macro_rules! define_port_error {
    (@ctor $variant:ident) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]() -> Self {
                Self::$variant
            }
        }
    };

    (@ctor $variant:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        define_port_error!(@ctor_impl $variant () () $( $field : $ty, )*);
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) ) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]($($params)*) -> Self {
                Self::$variant { $($inits)* }
            }
        }
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) $field:ident : $ty:ty, $($rest:tt)*) => {
        define_port_error!(
            @ctor_impl
            $variant
            ($($params)* $field: impl Into<$ty>,)
            ($($inits)* $field: $field.into(),)
            $($rest)*
        );
    };

    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $code:ident : $message:expr
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant $( { $($field : $ty),* } )?,
            )*
        }

        impl $name {
            $(
                define_port_error!(@ctor $variant $( { $($field : $ty),* } )?);
            )*

            /// Domain error category this failure surfaces as.
            pub fn code(&self) -> $crate::domain::ErrorCode {
                match self {
                    $( Self::$variant { .. } => $crate::domain::ErrorCode::$code, )*
                }
            }
        }

        impl From<$name> for $crate::domain::Error {
            fn from(value: $name) -> Self {
                $crate::domain::Error::new(value.code(), value.to_string())
            }
        }
    };
}

pub(crate) use define_port_error;

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use crate::domain::{Error, ErrorCode};

    define_port_error! {
        pub enum ProbeError {
            Offline => ServiceUnavailable: "probe offline",
            Rejected { reason: String } => Conflict: "probe rejected: {reason}",
            Corrupt { reason: String, offset: u32 } => InternalError: "corrupt at {offset}: {reason}",
        }
    }

    #[test]
    fn unit_variants_get_nullary_constructors() {
        assert_eq!(ProbeError::offline().to_string(), "probe offline");
    }

    #[test]
    fn constructors_accept_str_for_string_fields() {
        let err = ProbeError::rejected("stale");
        assert_eq!(err.to_string(), "probe rejected: stale");
    }

    #[test]
    fn constructors_support_mixed_fields() {
        let err = ProbeError::corrupt("bad byte", 7_u32);
        assert_eq!(err.to_string(), "corrupt at 7: bad byte");
    }

    #[test]
    fn lifts_into_domain_errors_with_declared_code() {
        let err: Error = ProbeError::rejected("stale").into();
        assert_eq!(err.code(), ErrorCode::Conflict);
        assert_eq!(err.message(), "probe rejected: stale");
    }
}
