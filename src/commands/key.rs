//! Implementation of the `locksmith key` command.
//!
//! Resolves the lock key an invocation would use and prints it.

use crate::cli::KeyArgs;
use locksmith::config::Config;
use locksmith::declaration::LockDeclaration;
use locksmith::error::LockError;
use locksmith::invocation::InvocationContext;

/// Execute the `locksmith key` command.
///
/// The template comes from `--template`, else from the declaration
/// registered for `Type::method`, else the key is derived from the call site.
pub fn cmd_key(config: &Config, args: KeyArgs) -> anyhow::Result<()> {
    let mut ctx = InvocationContext::new(&args.type_name, &args.method);
    if args.positional {
        ctx = ctx.positional(args.args.into_iter().map(|(_, value)| value).collect());
    } else {
        for (name, value) in args.args {
            ctx = ctx.arg(name, value);
        }
    }

    let interceptor = config.build_interceptor();
    let declaration = match args.template {
        Some(template) => LockDeclaration::new(template),
        None => interceptor.declaration_for(&ctx).cloned().unwrap_or_default(),
    };

    let key = interceptor
        .resolver()
        .resolve(&declaration, &ctx)
        .map_err(LockError::from)?;
    println!("{}", key);
    Ok(())
}
