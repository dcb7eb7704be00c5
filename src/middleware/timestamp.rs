use std::time::Instant;

use crate::fault::Fault;
use crate::request::Request;
use crate::response::{RequestTiming, Response};

use super::{Flow, Middleware};

/// Records when the request started, for the request logger's duration.
///
/// Must run first: anything that happens before it is not counted.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetStartTimestamp;

impl Middleware for SetStartTimestamp {
    fn handle(&self, _req: &Request, res: &mut Response) -> Result<Flow, Fault> {
        res.locals_mut().insert(RequestTiming::started(Instant::now()));
        Ok(Flow::Next)
    }
}
