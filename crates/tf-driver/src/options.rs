//! Translation of a [`DriverConfig`] into terraform command-line options.
//!
//! Options are described by a single table of rules. Each rule owns one
//! config field, the actions it applies to, and an emitter that yields
//! options only when the field differs from terraform's default (or the
//! corresponding flag is set). Passing only overrides keeps terraform's own
//! defaults intact. Table order is emission order.

use std::path::PathBuf;

use crate::action::Action;
use crate::config::{DriverConfig, DEFAULT_LOCK_TIMEOUT, DEFAULT_PARALLELISM};

/// A single typed terraform option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TfOption {
    Backend(bool),
    BackendConfig(String),
    ForceCopy,
    FromModule(String),
    Get(bool),
    Reconfigure,
    Upgrade,
    Target(String),
    Var(String),
    VarFile(String),
    Out(PathBuf),
    /// Saved plan file handed to `apply` as its positional argument.
    DirOrPlan(PathBuf),
    Refresh(bool),
    Destroy,
    Backup(String),
    Lock(bool),
    LockTimeout(String),
    Parallelism(u32),
    Replace(String),
    StateOut(String),
}

impl TfOption {
    pub fn is_positional(&self) -> bool {
        matches!(self, TfOption::DirOrPlan(_))
    }

    /// Render as a single command-line argument.
    pub fn to_arg(&self) -> String {
        match self {
            TfOption::Backend(b) => format!("-backend={b}"),
            TfOption::BackendConfig(v) => format!("-backend-config={v}"),
            TfOption::ForceCopy => "-force-copy".to_string(),
            TfOption::FromModule(m) => format!("-from-module={m}"),
            TfOption::Get(b) => format!("-get={b}"),
            TfOption::Reconfigure => "-reconfigure".to_string(),
            TfOption::Upgrade => "-upgrade".to_string(),
            TfOption::Target(t) => format!("-target={t}"),
            TfOption::Var(v) => format!("-var={v}"),
            TfOption::VarFile(f) => format!("-var-file={f}"),
            TfOption::Out(p) => format!("-out={}", p.display()),
            TfOption::DirOrPlan(p) => p.display().to_string(),
            TfOption::Refresh(b) => format!("-refresh={b}"),
            TfOption::Destroy => "-destroy".to_string(),
            TfOption::Backup(p) => format!("-backup={p}"),
            TfOption::Lock(b) => format!("-lock={b}"),
            TfOption::LockTimeout(t) => format!("-lock-timeout={t}"),
            TfOption::Parallelism(n) => format!("-parallelism={n}"),
            TfOption::Replace(r) => format!("-replace={r}"),
            TfOption::StateOut(p) => format!("-state-out={p}"),
        }
    }
}

/// Render options as arguments, with positional ones moved to the end.
pub fn to_args(options: &[TfOption]) -> Vec<String> {
    let (positional, flags): (Vec<&TfOption>, Vec<&TfOption>) =
        options.iter().partition(|o| o.is_positional());
    flags
        .into_iter()
        .chain(positional)
        .map(TfOption::to_arg)
        .collect()
}

// ─── Rule table ───────────────────────────────────────────────────────────

struct Rule {
    field: &'static str,
    actions: &'static [Action],
    emit: fn(&DriverConfig) -> Vec<TfOption>,
}

const INIT: &[Action] = &[Action::Init];
const PLAN: &[Action] = &[Action::Plan];
const APPLY: &[Action] = &[Action::Apply];
const CHANGE: &[Action] = &[Action::Plan, Action::Apply, Action::Destroy];
const WRITE_STATE: &[Action] = &[Action::Apply, Action::Destroy];

fn when(cond: bool, option: impl FnOnce() -> TfOption) -> Vec<TfOption> {
    if cond {
        vec![option()]
    } else {
        Vec::new()
    }
}

fn each(values: &[String], option: fn(String) -> TfOption) -> Vec<TfOption> {
    values.iter().cloned().map(option).collect()
}

static RULES: &[Rule] = &[
    // init
    Rule {
        field: "backend",
        actions: INIT,
        emit: |c| when(!c.backend, || TfOption::Backend(false)),
    },
    Rule {
        field: "backend_config",
        actions: INIT,
        emit: |c| each(&c.backend_config, TfOption::BackendConfig),
    },
    Rule {
        field: "force_copy",
        actions: INIT,
        emit: |c| when(c.force_copy, || TfOption::ForceCopy),
    },
    Rule {
        field: "from_module",
        actions: INIT,
        emit: |c| {
            c.from_module
                .iter()
                .filter(|m| !m.is_empty())
                .cloned()
                .map(TfOption::FromModule)
                .collect()
        },
    },
    Rule {
        field: "get",
        actions: INIT,
        emit: |c| when(!c.get, || TfOption::Get(false)),
    },
    Rule {
        field: "reconfigure",
        actions: INIT,
        emit: |c| when(c.reconfigure, || TfOption::Reconfigure),
    },
    Rule {
        field: "upgrade",
        actions: INIT,
        emit: |c| when(c.upgrade, || TfOption::Upgrade),
    },
    // plan / apply / destroy
    Rule {
        field: "target",
        actions: CHANGE,
        emit: |c| each(&c.target, TfOption::Target),
    },
    Rule {
        field: "var",
        actions: CHANGE,
        emit: |c| each(&c.var, TfOption::Var),
    },
    Rule {
        field: "var_file",
        actions: CHANGE,
        emit: |c| each(&c.var_file, TfOption::VarFile),
    },
    Rule {
        field: "plan_file",
        actions: PLAN,
        emit: |c| {
            c.plan_file()
                .map(|p| TfOption::Out(p.to_path_buf()))
                .into_iter()
                .collect()
        },
    },
    Rule {
        field: "plan_file",
        actions: APPLY,
        emit: |c| {
            c.plan_file()
                .map(|p| TfOption::DirOrPlan(p.to_path_buf()))
                .into_iter()
                .collect()
        },
    },
    Rule {
        field: "refresh",
        actions: CHANGE,
        emit: |c| when(!c.refresh, || TfOption::Refresh(false)),
    },
    Rule {
        field: "destroy",
        actions: PLAN,
        emit: |c| when(c.destroy, || TfOption::Destroy),
    },
    Rule {
        field: "backup",
        actions: WRITE_STATE,
        emit: |c| {
            c.backup
                .iter()
                .filter(|b| !b.is_empty())
                .cloned()
                .map(TfOption::Backup)
                .collect()
        },
    },
    Rule {
        field: "lock",
        actions: CHANGE,
        emit: |c| when(!c.lock, || TfOption::Lock(false)),
    },
    Rule {
        field: "lock_timeout",
        actions: CHANGE,
        emit: |c| {
            when(c.lock_timeout != DEFAULT_LOCK_TIMEOUT, || {
                TfOption::LockTimeout(c.lock_timeout.clone())
            })
        },
    },
    Rule {
        field: "parallelism",
        actions: CHANGE,
        emit: |c| {
            when(c.parallelism != DEFAULT_PARALLELISM, || {
                TfOption::Parallelism(c.parallelism)
            })
        },
    },
    Rule {
        field: "replace",
        actions: CHANGE,
        emit: |c| each(&c.replace, TfOption::Replace),
    },
    Rule {
        field: "state_out",
        actions: WRITE_STATE,
        emit: |c| {
            c.state_out
                .iter()
                .filter(|s| !s.is_empty())
                .cloned()
                .map(TfOption::StateOut)
                .collect()
        },
    },
];

/// Options for `action`, in table order. Actions without tunable options
/// (`output`, `show`, `force-unlock`) always get an empty list.
pub fn translate(action: Action, config: &DriverConfig) -> Vec<TfOption> {
    RULES
        .iter()
        .filter(|rule| rule.actions.contains(&action))
        .flat_map(|rule| (rule.emit)(config))
        .collect()
}

/// Config fields that influence `action`, for diagnostics.
pub fn fields_for(action: Action) -> Vec<&'static str> {
    let mut fields: Vec<&'static str> = RULES
        .iter()
        .filter(|rule| rule.actions.contains(&action))
        .map(|rule| rule.field)
        .collect();
    fields.dedup();
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> DriverConfig {
        DriverConfig::deploy("1.5.7", "infra")
    }

    #[test]
    fn defaults_translate_to_nothing() {
        let cfg = base();
        for action in Action::ALL {
            assert!(
                translate(action, &cfg).is_empty(),
                "{action} produced options for a default config"
            );
        }
    }

    #[test]
    fn targets_vars_and_parallelism_count_and_order() {
        let mut cfg = base();
        cfg.target = vec!["module.vpc".into(), "aws_instance.web".into()];
        cfg.var = vec!["region=us-east-1".into(), "size=t3.micro".into(), "env=dev".into()];
        cfg.parallelism = 4;

        for action in [Action::Plan, Action::Apply, Action::Destroy] {
            let opts = translate(action, &cfg);
            assert_eq!(opts.len(), 2 + 3 + 1, "{action}");
            assert_eq!(
                opts,
                vec![
                    TfOption::Target("module.vpc".into()),
                    TfOption::Target("aws_instance.web".into()),
                    TfOption::Var("region=us-east-1".into()),
                    TfOption::Var("size=t3.micro".into()),
                    TfOption::Var("env=dev".into()),
                    TfOption::Parallelism(4),
                ]
            );
        }
    }

    #[test]
    fn init_emits_only_overrides() {
        let mut cfg = base();
        cfg.backend = false;
        cfg.get = false;
        cfg.backend_config = vec!["bucket=state".into(), "key=prod".into()];
        cfg.upgrade = true;
        cfg.from_module = Some(String::new());

        let opts = translate(Action::Init, &cfg);
        assert_eq!(
            opts,
            vec![
                TfOption::Backend(false),
                TfOption::BackendConfig("bucket=state".into()),
                TfOption::BackendConfig("key=prod".into()),
                TfOption::Get(false),
                TfOption::Upgrade,
            ]
        );
    }

    #[test]
    fn plan_file_maps_to_out_for_plan_and_positional_for_apply() {
        let mut cfg = base();
        cfg.plan_file = Some(PathBuf::from("tfplan"));

        assert_eq!(
            translate(Action::Plan, &cfg),
            vec![TfOption::Out(PathBuf::from("tfplan"))]
        );
        assert_eq!(
            translate(Action::Apply, &cfg),
            vec![TfOption::DirOrPlan(PathBuf::from("tfplan"))]
        );
        assert!(translate(Action::Destroy, &cfg).is_empty());
    }

    #[test]
    fn disabled_flags_and_state_paths() {
        let mut cfg = base();
        cfg.refresh = false;
        cfg.lock = false;
        cfg.lock_timeout = "30s".into();
        cfg.backup = Some("state.bak".into());
        cfg.state_out = Some("out.tfstate".into());
        cfg.destroy = true;
        cfg.replace = vec!["aws_instance.web".into()];

        assert_eq!(
            translate(Action::Plan, &cfg),
            vec![
                TfOption::Refresh(false),
                TfOption::Destroy,
                TfOption::Lock(false),
                TfOption::LockTimeout("30s".into()),
                TfOption::Replace("aws_instance.web".into()),
            ]
        );
        assert_eq!(
            translate(Action::Destroy, &cfg),
            vec![
                TfOption::Refresh(false),
                TfOption::Backup("state.bak".into()),
                TfOption::Lock(false),
                TfOption::LockTimeout("30s".into()),
                TfOption::Replace("aws_instance.web".into()),
                TfOption::StateOut("out.tfstate".into()),
            ]
        );
    }

    #[test]
    fn args_render_with_positional_last() {
        let opts = vec![
            TfOption::DirOrPlan(PathBuf::from("tfplan")),
            TfOption::Lock(false),
            TfOption::Parallelism(2),
        ];
        assert_eq!(
            to_args(&opts),
            vec!["-lock=false", "-parallelism=2", "tfplan"]
        );
    }

    #[test]
    fn fields_for_lists_table_entries() {
        let fields = fields_for(Action::Init);
        assert_eq!(fields.first(), Some(&"backend"));
        assert!(fields.contains(&"upgrade"));
        assert!(!fields.contains(&"target"));
        assert!(fields_for(Action::Output).is_empty());
    }
}
