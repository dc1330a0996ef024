//! Per-channel DSP handles owned by a processing component.
//!
//! C++ source: `webrtc/modules/audio_processing/processing_component.cc`

/// Dense bank of handles, one per (capture channel, render channel) pair.
/// The handle for `(capture, render)` sits at `capture * num_render + render`.
/// Components that do not look at the render side use one render slot.
#[derive(Debug)]
pub(crate) struct HandleBank<T> {
    handles: Vec<T>,
    num_render: usize,
}

impl<T> Default for HandleBank<T> {
    fn default() -> Self {
        Self {
            handles: Vec::new(),
            num_render: 1,
        }
    }
}

impl<T> HandleBank<T> {
    /// Create `num_capture * num_render` handles. Nothing is kept if any
    /// of them fails.
    pub(crate) fn build<E>(
        num_capture: usize,
        num_render: usize,
        mut make: impl FnMut() -> Result<T, E>,
    ) -> Result<Self, E> {
        let handles = (0..num_capture * num_render)
            .map(|_| make())
            .collect::<Result<Vec<_>, E>>()?;
        Ok(Self {
            handles,
            num_render,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Drop every handle.
    pub(crate) fn clear(&mut self) {
        self.handles.clear();
    }

    pub(crate) fn get_mut(&mut self, capture: usize, render: usize) -> &mut T {
        debug_assert!(render < self.num_render);
        &mut self.handles[capture * self.num_render + render]
    }

    pub(crate) fn first(&self) -> Option<&T> {
        self.handles.first()
    }

    pub(crate) fn first_mut(&mut self) -> Option<&mut T> {
        self.handles.first_mut()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.handles.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.handles.iter_mut()
    }

    /// Handles fed by render channel `render`, one per capture channel.
    pub(crate) fn for_render_mut(&mut self, render: usize) -> impl Iterator<Item = &mut T> {
        self.handles
            .iter_mut()
            .skip(render)
            .step_by(self.num_render.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_is_capture_major() {
        let mut next = 0;
        let mut bank = HandleBank::build(2, 3, || {
            next += 1;
            Ok::<_, ()>(next - 1)
        })
        .unwrap();
        assert_eq!(bank.len(), 6);
        assert_eq!(*bank.get_mut(1, 2), 5);
        assert_eq!(*bank.get_mut(0, 1), 1);
        assert_eq!(bank.for_render_mut(1).map(|h| *h).collect::<Vec<_>>(), vec![1, 4]);
    }

    #[test]
    fn failed_build_keeps_nothing() {
        let mut calls = 0;
        let bank: Result<HandleBank<i32>, &str> = HandleBank::build(2, 1, || {
            calls += 1;
            if calls == 2 { Err("boom") } else { Ok(calls) }
        });
        assert_eq!(bank.err(), Some("boom"));
    }

    #[test]
    fn clear_empties() {
        let mut bank = HandleBank::build(1, 1, || Ok::<_, ()>(0u8)).unwrap();
        assert!(!bank.is_empty());
        bank.clear();
        assert!(bank.is_empty());
        assert!(bank.first().is_none());
    }
}
