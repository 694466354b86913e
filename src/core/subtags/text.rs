use crate::core::binder::BoundArgs;
use crate::core::context::BBTagContext;
use crate::core::definition::{SubtagCategory, SubtagDefinition, SubtagResult};
use crate::errors::EngineError;

pub fn definitions() -> Result<Vec<SubtagDefinition>, EngineError> {
    Ok(vec![
        SubtagDefinition::builder("regextest", SubtagCategory::Text)
            .description("Tests text against a regular expression.")
            .signature(&["text", "regex"], "Returns whether `regex` (`/pattern/flags`) matches `text`.", regextest)
            .build()?,
        SubtagDefinition::builder("regexreplace", SubtagCategory::Text)
            .description("Replaces regular expression matches.")
            .signature(
                &["text", "regex", "replacement"],
                "Replaces matches of `regex` in `text`. Only the first match is replaced unless the `g` flag is set.",
                regexreplace,
            )
            .build()?,
        SubtagDefinition::builder("lower", SubtagCategory::Text)
            .signature(&["text"], "Lower-cases `text`.", lower)
            .build()?,
    ])
}

fn lower(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    Ok(Some(args.value(ctx, 0).to_lowercase()))
}

fn regextest(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let text = args.value(ctx, 0);
    let source = args.value(ctx, 1);
    let regex = ctx.plugins().regex().build(&source)?;
    Ok(Some(regex.is_match(&text).to_string()))
}

fn regexreplace(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
    let text = args.value(ctx, 0);
    let source = args.value(ctx, 1);
    let replacement = args.value(ctx, 2);
    let regex = ctx.plugins().regex().build(&source)?;

    let global = source.starts_with('/') && source.rsplit('/').next().is_some_and(|flags| flags.contains('g'));
    let replaced = if global {
        regex.replace_all(&text, replacement.as_str())
    } else {
        regex.replace(&text, replacement.as_str())
    };
    Ok(Some(replaced.into_owned()))
}

#[cfg(test)]
mod tests {
    use crate::core::subtags::testing::output;

    #[test]
    fn regex_matching() {
        assert_eq!(output("{regextest;Hello;/^h/i}"), "true");
        assert_eq!(output("{regextest;Hello;/^h/}"), "false");
        assert_eq!(output("{regextest;abc;/a/q}"), "`Unsupported regex flag `q``");
    }

    #[test]
    fn regex_replacement() {
        assert_eq!(output("{regexreplace;a-b-c;/-/;+}"), "a+b-c");
        assert_eq!(output("{regexreplace;a-b-c;/-/g;+}"), "a+b+c");
    }

    #[test]
    fn lower_case() {
        assert_eq!(output("{lower;HeLLo}"), "hello");
    }
}
