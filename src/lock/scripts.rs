//! Server-side check-and-act scripts for lease release and renewal.
//!
//! Both scripts take the lock key as `KEYS[1]` and the owner token as
//! `ARGV[1]`; the check and the act run as one atomic step on the service.

use crate::coordinator::Script;

/// Deletes the key only if it still holds the caller's token.
///
/// Returns 1 when the key was deleted, 0 otherwise.
pub const UNLOCK: Script = Script::new(
    "unlock",
    r#"if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end"#,
);

/// Resets the key's expiration to `ARGV[2]` milliseconds only if it still
/// holds the caller's token.
///
/// Returns 1 when the lease was extended, 0 otherwise.
pub const REFRESH: Script = Script::new(
    "refresh",
    r#"if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("pexpire", KEYS[1], ARGV[2])
else
    return 0
end"#,
);
