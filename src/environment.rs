//! Variable storage as an arena of frames.
//!
//! Each frame holds a small ordered binding list and the id of its parent.
//! Closures capture a [`FrameId`] rather than a pointer, so frames shared by
//! several closures need no reference counting and cycles (a recursive
//! procedure stored in the frame it captures) are harmless.
//!
//! The arena only shrinks through [`Environment::release`], which drops the
//! frames pushed during a call when no closure was created in the meantime.
//! Frames reachable from closures live as long as the environment.

use tracing::trace;

use crate::value::{Procedure, Value};
use crate::{DEFAULT_MAX_EVAL_DEPTH, Error};

/// Index of a frame in the [`Environment`] arena
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FrameId(u32);

/// The global frame, always present
pub const GLOBAL: FrameId = FrameId(0);

/// Evaluation settings carried by an environment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalConfig {
    /// Active closure calls beyond which evaluation fails with [`Error::DepthLimit`]
    pub max_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_depth: DEFAULT_MAX_EVAL_DEPTH,
        }
    }
}

#[derive(Debug)]
struct Frame {
    parent: Option<FrameId>,
    bindings: Vec<(String, Value)>,
}

impl Frame {
    fn slot(&mut self, name: &str) -> Option<&mut Value> {
        self.bindings
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Arena position recorded before a call, see [`Environment::release`]
#[derive(Debug, Clone, Copy)]
pub struct Mark {
    frames: usize,
    closures: u64,
}

/// The interpreter state: every frame plus the evaluation settings.
///
/// Builtins are not stored here; a name with no binding that matches a
/// primitive resolves to that primitive at lookup time, so user bindings
/// shadow builtins without copying the table into every environment.
#[derive(Debug)]
pub struct Environment {
    frames: Vec<Frame>,
    closures_created: u64,
    config: EvalConfig,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::with_config(EvalConfig::default())
    }

    pub fn with_config(config: EvalConfig) -> Self {
        Environment {
            frames: vec![Frame {
                parent: None,
                bindings: Vec::new(),
            }],
            closures_created: 0,
            config,
        }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn global(&self) -> FrameId {
        GLOBAL
    }

    fn frame(&self, id: FrameId) -> &Frame {
        &self.frames[id.0 as usize]
    }

    fn frame_mut(&mut self, id: FrameId) -> &mut Frame {
        &mut self.frames[id.0 as usize]
    }

    /// Find the nearest binding of `name` starting at `frame`
    pub fn lookup(&self, frame: FrameId, name: &str) -> Option<Value> {
        let mut current = Some(frame);
        while let Some(id) = current {
            let frame = self.frame(id);
            if let Some((_, value)) = frame.bindings.iter().find(|(n, _)| n == name) {
                return Some(value.clone());
            }
            current = frame.parent;
        }
        None
    }

    pub fn is_bound(&self, frame: FrameId, name: &str) -> bool {
        self.lookup(frame, name).is_some()
    }

    /// Push a new frame whose parent is `parent`. The parent is not modified.
    pub fn extend(
        &mut self,
        parent: FrameId,
        bindings: Vec<(String, Value)>,
    ) -> Result<FrameId, Error> {
        let id = u32::try_from(self.frames.len())
            .map(FrameId)
            .map_err(|_| Error::Overflow("environment frame count".into()))?;
        trace!(frame = id.0, parent = parent.0, vars = bindings.len(), "extend");
        self.frames.push(Frame {
            parent: Some(parent),
            bindings,
        });
        Ok(id)
    }

    /// Bind `name` in `frame` itself, replacing an existing binding there.
    /// Bindings of the same name in enclosing frames are shadowed, not touched.
    pub fn define(&mut self, frame: FrameId, name: &str, value: Value) {
        let frame = self.frame_mut(frame);
        match frame.slot(name) {
            Some(slot) => *slot = value,
            None => frame.bindings.push((name.to_string(), value)),
        }
    }

    /// Overwrite the nearest existing binding of `name`
    pub fn assign(&mut self, frame: FrameId, name: &str, value: Value) -> Result<(), Error> {
        let mut current = Some(frame);
        while let Some(id) = current {
            let frame = self.frame_mut(id);
            if let Some(slot) = frame.slot(name) {
                *slot = value;
                return Ok(());
            }
            current = frame.parent;
        }
        Err(Error::UnboundVariable(name.to_string()))
    }

    /// Wrap a lambda in a closure over `frame`
    pub(crate) fn capture(&mut self, closure: crate::value::Closure) -> Value {
        self.closures_created += 1;
        Value::Procedure(Procedure::Closure(std::rc::Rc::new(closure)))
    }

    pub fn mark(&self) -> Mark {
        Mark {
            frames: self.frames.len(),
            closures: self.closures_created,
        }
    }

    /// Drop the frames pushed since `mark` if no closure was created since,
    /// since nothing can refer to them any more.
    pub fn release(&mut self, mark: Mark) {
        if self.closures_created == mark.closures && self.frames.len() > mark.frames {
            trace!(from = mark.frames, to = self.frames.len(), "release frames");
            self.frames.truncate(mark.frames);
        }
    }

    /// Number of live frames, including the global frame
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Global bindings in definition order
    pub fn global_bindings(&self) -> Vec<(&str, &Value)> {
        self.frame(GLOBAL)
            .bindings
            .iter()
            .map(|(n, v)| (n.as_str(), v))
            .collect()
    }
}
