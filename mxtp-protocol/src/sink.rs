use crate::reassembly::CompletedFrame;
#[cfg(test)] use mockall::automock;

/// Consumer of reassembled frames. Called synchronously from within
///  [`Reassembler::dispatch`](crate::reassembly::Reassembler::dispatch);
///  there is no return channel - a sink can neither reject nor throttle
///  frames, it has to keep up with the real-time stream.
///
/// Frames arrive in completion order, which may differ from sample-counter
///  order when fragments are lost or reordered.
#[cfg_attr(test, automock)]
pub trait FrameSink: Send {
    fn on_frame(&mut self, frame: &CompletedFrame);
}
