//! Event factories
//!
//! A factory preallocates every slot of a ring buffer during construction,
//! so the hot path never allocates. The factory is called exactly once per
//! slot before any producer or consumer can observe the buffer.

/// Factory for preallocating ring buffer slots.
///
/// # Examples
/// ```
/// use ringline::EventFactory;
///
/// struct Order {
///     id: u64,
///     quantity: u32,
/// }
///
/// struct OrderFactory;
///
/// impl EventFactory<Order> for OrderFactory {
///     fn new_instance(&self) -> Order {
///         Order { id: 0, quantity: 0 }
///     }
/// }
/// ```
pub trait EventFactory<T>: Send + Sync {
    /// Create one event instance in its initial state.
    fn new_instance(&self) -> T;
}

/// Factory that builds events through their [`Default`] impl.
pub struct DefaultEventFactory<T: Default> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T: Default> DefaultEventFactory<T> {
    /// Create a new default-backed factory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T: Default> Default for DefaultEventFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default + Send + Sync> EventFactory<T> for DefaultEventFactory<T> {
    fn new_instance(&self) -> T {
        T::default()
    }
}

/// Factory backed by a closure.
pub struct ClosureEventFactory<T, F>
where
    F: Fn() -> T + Send + Sync,
{
    factory_fn: F,
    _phantom: std::marker::PhantomData<T>,
}

impl<T, F> ClosureEventFactory<T, F>
where
    F: Fn() -> T + Send + Sync,
{
    /// Create a factory from `factory_fn`.
    pub fn new(factory_fn: F) -> Self {
        Self {
            factory_fn,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T, F> EventFactory<T> for ClosureEventFactory<T, F>
where
    T: Send + Sync,
    F: Fn() -> T + Send + Sync,
{
    fn new_instance(&self) -> T {
        (self.factory_fn)()
    }
}

/// Factory that clones a prototype event.
///
/// Useful when every slot should start from the same non-default state.
pub struct CloneEventFactory<T: Clone> {
    prototype: T,
}

impl<T: Clone> CloneEventFactory<T> {
    /// Create a factory cloning `prototype` for each slot.
    pub fn new(prototype: T) -> Self {
        Self { prototype }
    }
}

impl<T: Clone + Send + Sync> EventFactory<T> for CloneEventFactory<T> {
    fn new_instance(&self) -> T {
        self.prototype.clone()
    }
}

/// Shorthand for [`ClosureEventFactory::new`].
pub fn event_factory<T, F>(factory_fn: F) -> ClosureEventFactory<T, F>
where
    F: Fn() -> T + Send + Sync,
{
    ClosureEventFactory::new(factory_fn)
}
