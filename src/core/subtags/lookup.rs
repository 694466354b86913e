use log::trace;

use crate::core::binder::BoundArgs;
use crate::core::context::BBTagContext;
use crate::core::definition::{SubtagCategory, SubtagDefinition, SubtagHandler, SubtagResult};
use crate::core::entities::{Entity, EntityKind, LookupOptions};
use crate::errors::{BBTagError, EngineError};

/// What a lookup subtag prints for the entity it found.
#[derive(Debug, Clone, Copy)]
enum Field {
    Id,
    Name,
}

/// Finds one entity of `kind`, defaulting to the one the execution runs as.
#[derive(Debug, Clone, Copy)]
struct Lookup {
    kind: EntityKind,
    field: Field,
}

impl SubtagHandler for Lookup {
    fn execute(&self, ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>) -> SubtagResult {
        let entity = find(ctx, args, self.kind)?;
        Ok(Some(match self.field {
            Field::Id => entity.id,
            Field::Name => entity.name,
        }))
    }
}

fn lookup(id: &str, kind: EntityKind, field: Field, description: &str) -> Result<SubtagDefinition, EngineError> {
    let query = format!("{}?", kind.label());
    SubtagDefinition::builder(id, SubtagCategory::Lookup)
        .description(description)
        .signature(&[query.as_str(), "quiet?"], description, Lookup { kind, field })
        .build()
}

pub fn definitions() -> Result<Vec<SubtagDefinition>, EngineError> {
    Ok(vec![
        lookup("userid", EntityKind::User, Field::Id, "Returns the id of a user, by default the author.")?,
        lookup("username", EntityKind::User, Field::Name, "Returns the name of a user, by default the author.")?,
        lookup("channelid", EntityKind::Channel, Field::Id, "Returns the id of a channel, by default the current one.")?,
        SubtagDefinition::builder("usercount", SubtagCategory::Lookup)
            .description("Counts the users visible to the execution.")
            .signature(&[], "Returns the number of users.", usercount)
            .build()?,
    ])
}

/// An empty query means the entity the execution runs as and is matched by
/// id only. `quiet` defaults to the scope's quiet flag; any text other than a
/// false value turns it on.
fn find(ctx: &mut BBTagContext<'_>, args: &BoundArgs<'_>, kind: EntityKind) -> Result<Entity, BBTagError> {
    let query = args.value(ctx, 0);
    let quiet_text = args.value(ctx, 1);
    let quiet = if quiet_text.trim().is_empty() {
        ctx.is_quiet()
    } else {
        ctx.plugins().booleans().parse_boolean(&quiet_text).unwrap_or(true)
    };

    let (query, options) = if query.trim().is_empty() {
        let own = match kind {
            EntityKind::User => ctx.meta().author_id.clone(),
            EntityKind::Channel => ctx.meta().channel_id.clone(),
            _ => None,
        };
        (own.unwrap_or_default(), LookupOptions { no_lookup: true })
    } else {
        (query, LookupOptions::default())
    };
    trace!("Looking up {} '{}' (quiet: {})", kind.label(), query, quiet);

    if query.is_empty() {
        return Err(BBTagError::not_found(kind.label(), &query).quiet_if(quiet));
    }
    ctx.query_entity(kind, &query, options)?
        .ok_or_else(|| BBTagError::not_found(kind.label(), &query).quiet_if(quiet))
}

fn usercount(ctx: &mut BBTagContext<'_>, _: &BoundArgs<'_>) -> SubtagResult {
    Ok(Some(ctx.list_entities(EntityKind::User)?.len().to_string()))
}

#[cfg(test)]
mod tests {
    use crate::EngineBuilder;
    use crate::config::LimitConfig;
    use crate::core::context::ExecutionRequest;
    use crate::core::subtags::testing::{engine, output, run};
    use crate::errors::ErrorKind;

    #[test]
    fn defaults_to_the_author_and_channel() {
        assert_eq!(output("{userid}|{username}|{channelid}"), "1|Ann|3");
    }

    #[test]
    fn searches_by_name() {
        assert_eq!(output("{userid;bob}"), "42");
        assert_eq!(output("{username;42}"), "Bob");
        assert_eq!(output("{usercount}"), "2");
    }

    #[test]
    fn missing_entities_respect_quiet() {
        assert_eq!(output("{userid;nobody}"), "`No user found`");
        assert_eq!(output("{userid;nobody;true}"), "");
        assert_eq!(output("{quiet}{userid;nobody}"), "");
        assert_eq!(output("{quiet}{userid;nobody;false}"), "`No user found`");

        let result = run(&engine(), "{userid;nobody;yes}");
        assert_eq!(result.errors[0].error.kind, ErrorKind::NotFound);
    }

    #[test]
    fn lookups_count_as_requests() {
        let limits = LimitConfig { max_requests: 1, ..LimitConfig::default() };
        let request = ExecutionRequest::new("test").author("1").limits(limits);
        let result = engine().execute("{userid}{userid}", request);
        assert_eq!(result.output, "1`Too many requests`");
        assert_eq!(result.errors[0].error.kind, ErrorKind::ResourceLimit);
    }

    #[test]
    fn missing_service_is_a_host_failure() {
        let engine = EngineBuilder::new().build().unwrap();
        let result = engine.execute("{userid;bob}", ExecutionRequest::new("test"));
        assert_eq!(result.errors[0].error.kind, ErrorKind::HostFailure);
    }
}
