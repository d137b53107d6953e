//! Macros for ergonomic state machine construction.

/// Declare a struct holding a set of named event definitions.
///
/// Each field is an [`Event`](crate::event::Event) named after the field,
/// with its own id. Copies made from a field (`with_data`, `with_source`)
/// match the same triggers.
///
/// # Example
///
/// ```
/// use statecraft::events;
///
/// events! {
///     pub struct DoorEvents {
///         open,
///         close,
///         lock,
///     }
/// }
///
/// let events = DoorEvents::new();
/// assert_eq!(events.open.name(), "open");
/// assert!(!events.open.is_same(&events.close));
/// ```
#[macro_export]
macro_rules! events {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field:ident
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                pub $field: $crate::event::Event
            ),*
        }

        impl $name {
            pub fn new() -> Self {
                Self {
                    $($field: $crate::event::Event::new(stringify!($field))),*
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}
