pub trait Combine {
    /// Combine two values, preferring the values in `self`.
    ///
    /// Scalars from the higher precedence layer win outright. Lists are not
    /// merged: a layer that sets a list replaces the lower precedence one.
    #[must_use]
    fn combine(self, other: Self) -> Self;
}

impl<T> Combine for Option<T> {
    fn combine(self, other: Self) -> Self {
        self.or(other)
    }
}
