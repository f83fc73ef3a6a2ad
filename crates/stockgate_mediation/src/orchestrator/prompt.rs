//! System prompt construction.

use crate::context::RequestContext;
use crate::tools::ToolRegistry;

pub(crate) fn system_prompt(ctx: &RequestContext, tools: &ToolRegistry) -> String {
    let capabilities: Vec<&str> = ctx.capabilities().iter().map(|c| c.as_str()).collect();
    let scope = match ctx.branch_id {
        Some(ref branch) => format!("branch {} of company {}", branch, ctx.company_id),
        None => format!("company {} (all branches)", ctx.company_id),
    };

    format!(
        "You are the inventory assistant for {scope}.\n\
         The user's role is {role}; their capabilities are: {caps}.\n\
         \n\
         Read-only tools ({reads}) run immediately.\n\
         Every other tool only PROPOSES a change: nothing is written until a \
         human confirms it. Never claim a change was made; say it is awaiting \
         confirmation.\n\
         Describe items the way the user did (name, category, unit). If a tool \
         result says the item needs clarification, ask the user which item \
         they mean instead of guessing.\n\
         Keep answers short and concrete.",
        scope = scope,
        role = ctx.role,
        caps = capabilities.join(", "),
        reads = tools.read_only().join(", "),
    )
}
