//! Macro for building case registries.
//!
//! - `cases!`: build an ordered `Vec<Case>` from description/body pairs

/// Build an ordered case registry.
///
/// Each entry is `description => body`. The body is a plain closure by
/// default; prefix it with `control` for a body returning a
/// [`Control`](crate::Control) directive, or `counted` for one observing
/// the repeat counter. `pending` declares a case with no body.
///
/// # Example
///
/// ```
/// use gauntlet::{cases, Control};
///
/// let registry = cases! {
///     "plain action" => || { /* assertions */ },
///     "repeats itself" => counted |n| {
///         if n < 3 { Control::repeat_case() } else { Control::done() }
///     },
///     "not written yet" => pending,
/// };
/// assert_eq!(registry.len(), 3);
/// ```
#[macro_export]
macro_rules! cases {
    // One entry per rule; recurse on the remainder. These internal rules
    // must precede the `tt` catch-all so recursive calls reach them.
    (@push $registry:ident, $desc:expr => pending $(, $($rest:tt)*)?) => {
        $registry.push($crate::Case::pending($desc));
        $($crate::cases!(@push $registry, $($rest)*);)?
    };
    (@push $registry:ident, $desc:expr => control $body:expr $(, $($rest:tt)*)?) => {
        $registry.push($crate::Case::controlled($desc, $body));
        $($crate::cases!(@push $registry, $($rest)*);)?
    };
    (@push $registry:ident, $desc:expr => counted $body:expr $(, $($rest:tt)*)?) => {
        $registry.push($crate::Case::counted($desc, $body));
        $($crate::cases!(@push $registry, $($rest)*);)?
    };
    (@push $registry:ident, $desc:expr => $body:expr $(, $($rest:tt)*)?) => {
        $registry.push($crate::Case::new($desc, $body));
        $($crate::cases!(@push $registry, $($rest)*);)?
    };
    (@push $registry:ident,) => {};
    (@push $registry:ident) => {};

    () => {
        ::std::vec::Vec::<$crate::Case>::new()
    };
    ($($entries:tt)+) => {{
        let mut registry: ::std::vec::Vec<$crate::Case> = ::std::vec::Vec::new();
        $crate::cases!(@push registry, $($entries)+);
        registry
    }};
}
