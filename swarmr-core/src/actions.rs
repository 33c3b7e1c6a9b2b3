use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::executor::PlannedRequest;
use crate::record::{Action, Method};

/// Paths of the target's routes. `item` addresses one resource and must contain `{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointMap {
    pub health: String,
    pub list: String,
    pub create: String,
    pub item: String,
    pub stats: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<(Method, String)>,
}

impl Default for EndpointMap {
    fn default() -> Self {
        Self {
            health: "/health".to_string(),
            list: "/todos".to_string(),
            create: "/todos".to_string(),
            item: "/todos/{id}".to_string(),
            stats: "/stats".to_string(),
            custom: None,
        }
    }
}

impl EndpointMap {
    pub fn validate(&self) -> Result<()> {
        let custom = self.custom.as_ref().map(|(_, p)| p);
        for path in [&self.health, &self.list, &self.create, &self.item, &self.stats]
            .into_iter()
            .chain(custom)
        {
            if !path.starts_with('/') {
                return Err(Error::InvalidEndpointPath(path.clone()));
            }
        }
        if !self.item.contains("{id}") {
            return Err(Error::MissingIdPlaceholder(self.item.clone()));
        }
        Ok(())
    }
}

/// Per-call inputs for a request builder.
pub struct BuildContext<'a> {
    pub worker_id: u64,
    /// Per-worker request sequence number, starting at 1.
    pub seq: u64,
    /// Resource to address, for actions that need one.
    pub resource_id: Option<&'a str>,
    pub rng: &'a mut StdRng,
}

pub type RequestBuilder =
    Arc<dyn Fn(&EndpointMap, &mut BuildContext<'_>) -> PlannedRequest + Send + Sync>;

/// Maps each action to the function that turns it into a concrete request.
#[derive(Clone)]
pub struct ActionSet {
    endpoints: EndpointMap,
    builders: HashMap<Action, RequestBuilder>,
}

impl fmt::Debug for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<_> = self.builders.keys().collect();
        actions.sort();
        f.debug_struct("ActionSet")
            .field("endpoints", &self.endpoints)
            .field("actions", &actions)
            .finish()
    }
}

impl ActionSet {
    pub fn new(endpoints: EndpointMap) -> Self {
        Self {
            endpoints,
            builders: HashMap::new(),
        }
    }

    /// Builders for a CRUD-style todo API.
    pub fn todo_api(endpoints: EndpointMap) -> Self {
        let custom = endpoints.custom.clone();
        let mut set = Self::new(endpoints)
            .with_builder(Action::HealthCheck, |ep, _| {
                PlannedRequest::new(Action::HealthCheck, Method::Get, ep.health.clone())
            })
            .with_builder(Action::ListItems, |ep, _| {
                PlannedRequest::new(Action::ListItems, Method::Get, ep.list.clone())
            })
            .with_builder(Action::CreateItem, |ep, ctx| {
                PlannedRequest::new(Action::CreateItem, Method::Post, ep.create.clone())
                    .with_body(json!({
                        "title": item_title(ctx),
                        "completed": false,
                    }))
            })
            .with_builder(Action::UpdateItem, |ep, ctx| {
                let completed = ctx.rng.random_bool(0.5);
                let req = PlannedRequest::new(Action::UpdateItem, Method::Patch, ep.item.clone())
                    .with_body(json!({ "completed": completed }));
                match ctx.resource_id {
                    Some(id) => req.with_resource(id),
                    None => req,
                }
            })
            .with_builder(Action::DeleteItem, |ep, ctx| {
                let req = PlannedRequest::new(Action::DeleteItem, Method::Delete, ep.item.clone());
                match ctx.resource_id {
                    Some(id) => req.with_resource(id),
                    None => req,
                }
            })
            .with_builder(Action::Stats, |ep, _| {
                PlannedRequest::new(Action::Stats, Method::Get, ep.stats.clone())
            });

        if custom.is_some() {
            set = set.with_builder(Action::Custom, |ep, _| match &ep.custom {
                Some((method, path)) => PlannedRequest::new(Action::Custom, *method, path.clone()),
                None => PlannedRequest::new(Action::Custom, Method::Get, "/"),
            });
        }
        set
    }

    #[must_use]
    pub fn with_builder<F>(mut self, action: Action, builder: F) -> Self
    where
        F: Fn(&EndpointMap, &mut BuildContext<'_>) -> PlannedRequest + Send + Sync + 'static,
    {
        self.builders.insert(action, Arc::new(builder));
        self
    }

    pub fn supports(&self, action: Action) -> bool {
        self.builders.contains_key(&action)
    }

    pub fn build(&self, action: Action, ctx: &mut BuildContext<'_>) -> Option<PlannedRequest> {
        let builder = self.builders.get(&action)?;
        Some(builder(&self.endpoints, ctx))
    }

    pub fn validate_plan(&self, plan: &ActionPlan) -> Result<()> {
        self.endpoints.validate()?;
        for action in plan.actions() {
            if !self.supports(action) {
                return Err(Error::UnsupportedAction(action));
            }
            // Resource actions fall back to a create until an id is known.
            if action.needs_resource() && !self.supports(Action::CreateItem) {
                return Err(Error::UnsupportedAction(Action::CreateItem));
            }
        }
        Ok(())
    }
}

fn item_title(ctx: &mut BuildContext<'_>) -> String {
    let suffix: u32 = ctx.rng.random_range(0..0x0100_0000);
    format!("load-{}-{}-{suffix:06x}", ctx.worker_id, ctx.seq)
}

/// How each worker picks its next action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPlan {
    Fixed(Action),
    /// Random per request, in proportion to the weights.
    Weighted(Vec<(Action, u32)>),
    Sequence(Vec<Action>),
    /// Each worker is pinned to one action; workers are split in proportion to the weights.
    PerWorker(Vec<(Action, u32)>),
}

impl Default for ActionPlan {
    fn default() -> Self {
        Self::Weighted(vec![
            (Action::ListItems, 1),
            (Action::CreateItem, 1),
            (Action::Stats, 1),
            (Action::HealthCheck, 1),
        ])
    }
}

impl ActionPlan {
    pub fn actions(&self) -> Vec<Action> {
        match self {
            Self::Fixed(a) => vec![*a],
            Self::Weighted(items) | Self::PerWorker(items) => {
                items.iter().map(|(a, _)| *a).collect()
            }
            Self::Sequence(items) => items.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Fixed(_) => Ok(()),
            Self::Weighted(items) | Self::PerWorker(items) if items.is_empty() => {
                Err(Error::EmptyPlan)
            }
            Self::Weighted(items) | Self::PerWorker(items)
                if items.iter().all(|(_, w)| *w == 0) =>
            {
                Err(Error::InvalidWeights)
            }
            Self::Weighted(_) | Self::PerWorker(_) => Ok(()),
            Self::Sequence(items) if items.is_empty() => Err(Error::EmptyPlan),
            Self::Sequence(_) => Ok(()),
        }
    }

    /// Selector for worker `worker_id` (1-based) of a pool of `workers`.
    pub fn selector_for(&self, worker_id: u64, workers: u64) -> Result<ActionSelector> {
        self.validate()?;
        Ok(match self {
            Self::Fixed(a) => ActionSelector::Fixed(*a),
            Self::PerWorker(items) => {
                ActionSelector::Fixed(assigned_action(items, worker_id, workers))
            }
            Self::Weighted(items) => {
                let dist = WeightedIndex::new(items.iter().map(|(_, w)| *w))
                    .map_err(|_| Error::InvalidWeights)?;
                ActionSelector::Weighted {
                    actions: items.iter().map(|(a, _)| *a).collect(),
                    dist,
                }
            }
            Self::Sequence(items) => ActionSelector::Sequence {
                actions: items.clone(),
                next: 0,
            },
        })
    }
}

/// Action of worker `worker_id` when `workers` are split by weight.
///
/// Each entry gets `floor(workers * weight / total)` workers in order; the remainder goes to
/// the last positive-weight entry. Ten workers over equal weights split 3/3/4.
fn assigned_action(items: &[(Action, u32)], worker_id: u64, workers: u64) -> Action {
    let total: u64 = items.iter().map(|(_, w)| u64::from(*w)).sum();
    let Some(last) = items.iter().rposition(|(_, w)| *w > 0) else {
        return items.first().map_or(Action::HealthCheck, |(a, _)| *a);
    };

    let mut upper = 0u64;
    for (i, (action, weight)) in items.iter().enumerate() {
        if i == last {
            break;
        }
        upper += workers.saturating_mul(u64::from(*weight)) / total.max(1);
        if worker_id <= upper {
            return *action;
        }
    }
    items[last].0
}

/// Per-worker selection state derived from an [`ActionPlan`].
#[derive(Debug, Clone)]
pub enum ActionSelector {
    Fixed(Action),
    Weighted {
        actions: Vec<Action>,
        dist: WeightedIndex<u32>,
    },
    Sequence {
        actions: Vec<Action>,
        next: usize,
    },
}

impl ActionSelector {
    pub fn next_action(&mut self, rng: &mut StdRng) -> Action {
        match self {
            Self::Fixed(a) => *a,
            Self::Weighted { actions, dist } => actions[dist.sample(rng)],
            Self::Sequence { actions, next } => {
                let action = actions[*next % actions.len()];
                *next = (*next + 1) % actions.len();
                action
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn default_endpoints_validate() {
        assert!(EndpointMap::default().validate().is_ok());
    }

    #[test]
    fn item_path_requires_placeholder() {
        let ep = EndpointMap {
            item: "/todos/:id".to_string(),
            ..EndpointMap::default()
        };
        assert!(matches!(ep.validate(), Err(Error::MissingIdPlaceholder(_))));

        let ep = EndpointMap {
            health: "health".to_string(),
            ..EndpointMap::default()
        };
        assert!(matches!(ep.validate(), Err(Error::InvalidEndpointPath(_))));
    }

    #[test]
    fn todo_builders_produce_expected_requests() {
        let set = ActionSet::todo_api(EndpointMap::default());
        let mut rng = rng();
        let mut ctx = BuildContext {
            worker_id: 3,
            seq: 9,
            resource_id: Some("12"),
            rng: &mut rng,
        };

        let create = set.build(Action::CreateItem, &mut ctx).unwrap();
        assert_eq!(create.method, Method::Post);
        assert_eq!(create.path, "/todos");
        let title = create.body.as_ref().unwrap()["title"].as_str().unwrap().to_string();
        assert!(title.starts_with("load-3-9-"), "{title}");

        let update = set.build(Action::UpdateItem, &mut ctx).unwrap();
        assert_eq!(update.method, Method::Patch);
        assert_eq!(update.endpoint, "/todos/{id}");
        assert_eq!(update.path, "/todos/12");
        assert!(update.body.as_ref().unwrap()["completed"].is_boolean());

        let delete = set.build(Action::DeleteItem, &mut ctx).unwrap();
        assert_eq!(delete.method, Method::Delete);
        assert_eq!(delete.path, "/todos/12");

        assert!(set.build(Action::Custom, &mut ctx).is_none());
    }

    #[test]
    fn custom_action_uses_configured_route() {
        let ep = EndpointMap {
            custom: Some((Method::Post, "/echo".to_string())),
            ..EndpointMap::default()
        };
        let set = ActionSet::todo_api(ep);
        let mut rng = rng();
        let mut ctx = BuildContext {
            worker_id: 1,
            seq: 1,
            resource_id: None,
            rng: &mut rng,
        };
        let req = set.build(Action::Custom, &mut ctx).unwrap();
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.path, "/echo");
    }

    #[test]
    fn plan_validation() {
        assert!(matches!(
            ActionPlan::Weighted(vec![]).validate(),
            Err(Error::EmptyPlan)
        ));
        assert!(matches!(
            ActionPlan::Weighted(vec![(Action::Stats, 0)]).validate(),
            Err(Error::InvalidWeights)
        ));
        assert!(matches!(
            ActionPlan::Sequence(vec![]).validate(),
            Err(Error::EmptyPlan)
        ));

        let set = ActionSet::todo_api(EndpointMap::default());
        assert!(matches!(
            set.validate_plan(&ActionPlan::Fixed(Action::Custom)),
            Err(Error::UnsupportedAction(Action::Custom))
        ));
        assert!(set.validate_plan(&ActionPlan::default()).is_ok());
    }

    #[test]
    fn sequence_cycles_in_order() {
        let plan = ActionPlan::Sequence(vec![Action::ListItems, Action::CreateItem, Action::HealthCheck]);
        let mut sel = plan.selector_for(1, 1).unwrap();
        let mut rng = rng();
        let got: Vec<_> = (0..7).map(|_| sel.next_action(&mut rng)).collect();
        assert_eq!(
            got,
            vec![
                Action::ListItems,
                Action::CreateItem,
                Action::HealthCheck,
                Action::ListItems,
                Action::CreateItem,
                Action::HealthCheck,
                Action::ListItems,
            ]
        );
    }

    #[test]
    fn weighted_respects_zero_weights() {
        let plan = ActionPlan::Weighted(vec![(Action::Stats, 0), (Action::ListItems, 3)]);
        let mut sel = plan.selector_for(1, 1).unwrap();
        let mut rng = rng();
        for _ in 0..200 {
            assert_eq!(sel.next_action(&mut rng), Action::ListItems);
        }
    }

    #[test]
    fn weighted_mix_covers_every_positive_action() {
        let mut sel = ActionPlan::default().selector_for(1, 1).unwrap();
        let mut rng = rng();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.insert(sel.next_action(&mut rng));
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn per_worker_plan_splits_the_pool_by_weight() {
        let plan = ActionPlan::PerWorker(vec![
            (Action::HealthCheck, 1),
            (Action::ListItems, 1),
            (Action::CreateItem, 1),
        ]);
        let mut rng = rng();
        let assigned: Vec<_> = (1..=10)
            .map(|id| plan.selector_for(id, 10).unwrap().next_action(&mut rng))
            .collect();
        assert_eq!(
            assigned,
            vec![
                Action::HealthCheck,
                Action::HealthCheck,
                Action::HealthCheck,
                Action::ListItems,
                Action::ListItems,
                Action::ListItems,
                Action::CreateItem,
                Action::CreateItem,
                Action::CreateItem,
                Action::CreateItem,
            ]
        );

        // Fewer workers than entries: the remainder still lands on the last action.
        let two: Vec<_> = (1..=2)
            .map(|id| plan.selector_for(id, 2).unwrap().next_action(&mut rng))
            .collect();
        assert_eq!(two, vec![Action::CreateItem, Action::CreateItem]);
    }

    #[test]
    fn per_worker_plan_skips_zero_weights_and_validates() {
        let plan = ActionPlan::PerWorker(vec![(Action::ListItems, 3), (Action::Stats, 0)]);
        let mut rng = rng();
        for id in 1..=4 {
            assert_eq!(
                plan.selector_for(id, 4).unwrap().next_action(&mut rng),
                Action::ListItems
            );
        }
        assert!(matches!(
            ActionPlan::PerWorker(vec![]).validate(),
            Err(Error::EmptyPlan)
        ));
        assert!(matches!(
            ActionPlan::PerWorker(vec![(Action::Stats, 0)]).selector_for(1, 1),
            Err(Error::InvalidWeights)
        ));
    }
}
