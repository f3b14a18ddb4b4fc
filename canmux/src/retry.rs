/// Run `op` until it succeeds or `budget` attempts have been made.
///
/// At least one attempt is always made. On exhaustion the error of the last attempt is returned.
pub(crate) fn with_budget<T, E>(
    budget: u32,
    mut op: impl FnMut() -> Result<T, E>,
) -> Result<T, E> {
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= budget => return Err(e),
            Err(_) => attempt += 1,
        }
    }
}
