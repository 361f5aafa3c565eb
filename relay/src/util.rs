/// Splits `!name args` into `("name", "args")`
pub fn split_cmd<'a>(prefix: &str, text: &'a str) -> Option<(&'a str, &'a str)> {
    let cmd = text.strip_prefix(prefix)?;
    let (name, args) = match cmd.split_once(' ') {
        Some((name, args)) => (name, args.trim()),
        None => (cmd, ""),
    };
    if name.is_empty() {
        return None;
    }

    Some((name, args))
}
