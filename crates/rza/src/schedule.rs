//! The render cycle's state machine.
//!
//! `Idle → Scheduled → Rendering → Idle`, where a request arriving while
//! `Rendering` only raises a flag. That flag turns the finishing render stale so
//! it is discarded and the cycle starts over with fresh settings.
//!
//! Nothing here touches a host. [`Gizmo`](crate::gizmo::Gizmo) drives it.

/// Where the render cycle is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    /// A render task has been spawned but hasn't started.
    Scheduled,
    /// The widget's render function is running.
    Rendering,
}

/// What to do about a render request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request {
    /// Spawn a render task.
    Arm,
    /// A render task is already waiting to run.
    Pending,
    /// A render is running; it will be restarted when it finishes.
    Coalesced,
}

/// What to do with a finished render's result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settle {
    /// Apply it.
    Fresh,
    /// Discard it and request another render.
    Stale,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Schedule {
    phase: Phase,
    rerender: bool,
}

impl Schedule {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_rendering(&self) -> bool {
        self.phase == Phase::Rendering
    }

    pub fn rerender_requested(&self) -> bool {
        self.rerender
    }

    pub fn request(&mut self) -> Request {
        match self.phase {
            Phase::Rendering => {
                self.rerender = true;
                Request::Coalesced
            }
            Phase::Scheduled => Request::Pending,
            Phase::Idle => {
                self.phase = Phase::Scheduled;
                Request::Arm
            }
        }
    }

    /// The spawned render task started.
    pub fn begin(&mut self) {
        self.phase = Phase::Rendering;
    }

    /// The render function returned.
    ///
    /// A stale result leaves the schedule idle so the follow-up request arms a
    /// new task. A fresh one stays `Rendering` until [`Schedule::finish`], so
    /// that applying the result is still part of the render.
    pub fn settle(&mut self) -> Settle {
        if std::mem::take(&mut self.rerender) {
            self.phase = Phase::Idle;
            Settle::Stale
        } else {
            Settle::Fresh
        }
    }

    /// The result was applied.
    pub fn finish(&mut self) {
        self.phase = Phase::Idle;
    }

    /// The render function failed.
    ///
    /// Returns whether a render was requested while it ran.
    pub fn fail(&mut self) -> bool {
        self.phase = Phase::Idle;
        std::mem::take(&mut self.rerender)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn requests_coalesce_until_the_task_runs() {
        let mut schedule = Schedule::default();
        assert_eq!(schedule.request(), Request::Arm);
        assert_eq!(schedule.request(), Request::Pending);
        assert_eq!(schedule.request(), Request::Pending);
        assert_eq!(schedule.phase(), Phase::Scheduled);
    }

    #[test]
    fn request_during_render_makes_it_stale() {
        let mut schedule = Schedule::default();
        schedule.request();
        schedule.begin();
        assert_eq!(schedule.request(), Request::Coalesced);
        assert_eq!(schedule.request(), Request::Coalesced);
        assert!(schedule.rerender_requested());
        assert_eq!(schedule.settle(), Settle::Stale);
        assert_eq!(schedule.phase(), Phase::Idle);
        // exactly one follow-up
        assert_eq!(schedule.request(), Request::Arm);
        schedule.begin();
        assert_eq!(schedule.settle(), Settle::Fresh);
        assert!(schedule.is_rendering());
        schedule.finish();
        assert_eq!(schedule.phase(), Phase::Idle);
    }

    #[test]
    fn failure_never_locks_out() {
        let mut schedule = Schedule::default();
        schedule.request();
        schedule.begin();
        assert!(!schedule.fail());
        assert_eq!(schedule.request(), Request::Arm);
        schedule.begin();
        schedule.request();
        assert!(schedule.fail());
        assert!(!schedule.rerender_requested());
    }
}
