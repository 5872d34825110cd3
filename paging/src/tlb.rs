use types::VirtAddr;

/// The processor's translation cache. Implemented by the kernel on top of `cr3` reloads and
/// `invlpg`, and by recording doubles in tests.
pub trait TranslationCache {
    /// Drop every cached translation, e.g. by reloading the page directory base register.
    fn flush_all(&mut self);

    /// Drop the cached translation of the page containing `addr`.
    fn invalidate(&mut self, addr: VirtAddr);
}
