//! Declarative macros to reduce boilerplate across the ecflow codebase

/// Define an enum with automatic `name()`, `all()`, `from_name()` and `Display`
///
/// # Example
/// ```
/// use ecflow::named_enum;
///
/// named_enum! {
///     pub enum LedColor {
///         White => "white",
///         Amber => "amber",
///     }
/// }
///
/// // Usage
/// let color = LedColor::Amber;
/// assert_eq!(color.name(), "amber");
/// assert_eq!(LedColor::from_name("white"), Some(LedColor::White));
/// assert_eq!(LedColor::all().len(), 2);
/// ```
///
/// Expands to:
/// - An enum with Debug, Clone, Copy, PartialEq, Eq, Hash derives
/// - `name(&self) -> &'static str`, `all() -> Vec<Self>`,
///   `from_name(&str) -> Option<Self>`
/// - A `Display` impl printing the name
#[macro_export]
macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => $str:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant,)*
        }

        impl $name {
            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $str,)*
                }
            }

            pub fn all() -> Vec<$name> {
                vec![$($name::$variant,)*]
            }

            pub fn from_name(name: &str) -> Option<$name> {
                match name {
                    $($str => Some($name::$variant),)*
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

/// Define an enum with name() and all() methods, plus custom data per variant
///
/// # Example
/// ```
/// use ecflow::enum_with_data;
///
/// enum_with_data! {
///     pub enum Opcode: u16 {
///         Halt => ("halt", 0x00),
///         Kick => ("kick", 0x01),
///     }
///     impl value -> u16
/// }
///
/// let op = Opcode::Kick;
/// assert_eq!(op.name(), "kick");
/// assert_eq!(op.value(), 0x01);
/// ```
#[macro_export]
macro_rules! enum_with_data {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident: $data_type:ty {
            $($variant:ident => ($str:literal, $data:expr)),* $(,)?
        }
        impl $method:ident -> $return_type:ty
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant,)*
        }

        impl $name {
            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $str,)*
                }
            }

            pub fn $method(&self) -> $return_type {
                match self {
                    $($name::$variant => $data,)*
                }
            }

            pub fn all() -> Vec<$name> {
                vec![$($name::$variant,)*]
            }
        }
    };
}

/// Gather metrics from an exporter's registry
///
/// # Example
/// ```ignore
/// // In main.rs metrics handler
/// let mut buffer = Vec::new();
/// gather_metrics!(buffer, encoder, state.power_sense_exporter, "power-sense");
/// ```
#[macro_export]
macro_rules! gather_metrics {
    ($buffer:expr, $encoder:expr, $exporter:expr, $name:literal) => {
        if let Some(ref exporter) = $exporter {
            let metric_families = exporter.registry().gather();
            if let Err(e) = $encoder.encode(&metric_families, &mut $buffer) {
                tracing::error!(concat!("Failed to encode ", $name, " metrics: {}"), e);
            }
        }
    };
}
