//! Declarative macros for the small named enums of the agent

/// Define a named enum with automatic `name()` and `all()` implementations
///
/// # Example
/// ```
/// use chaslice::named_enum;
///
/// named_enum! {
///     pub enum Section {
///         Overall => "overall",
///         PerBox => "per-box",
///     }
/// }
///
/// assert_eq!(Section::PerBox.name(), "per-box");
/// assert_eq!(Section::all().len(), 2);
/// ```
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
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

/// Define an enum carrying one constant per variant
///
/// # Example
/// ```
/// use chaslice::enum_with_data;
///
/// enum_with_data! {
///     pub enum LlcState: u32 {
///         M => ("M", 0x40),
///         E => ("E", 0x20),
///         S => ("S", 0x02),
///         I => ("I", 0x01),
///     }
///     impl value -> u32
/// }
///
/// let state = LlcState::M;
/// assert_eq!(state.name(), "M");
/// assert_eq!(state.value(), 0x40);
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
