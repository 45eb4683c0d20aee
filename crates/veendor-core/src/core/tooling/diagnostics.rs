pub mod reasons {
    pub const NODE_MODULES_EXIST: &str = "node_modules_exist";
    pub const MANIFEST_MISSING: &str = "manifest_missing";
    pub const MANIFEST_INVALID: &str = "manifest_invalid";
    pub const NOT_A_GIT_REPO: &str = "not_a_git_repo";
    pub const BUNDLES_NOT_FOUND: &str = "bundles_not_found";
    pub const PUBLISH_RACE: &str = "publish_race";
    pub const BACKEND_FAILED: &str = "backend_failed";
    pub const PROCESS_FAILED: &str = "process_failed";
    pub const CONFIG_INVALID: &str = "config_invalid";
    pub const GIT_FAILED: &str = "git_failed";
    pub const INTERNAL: &str = "internal_error";
}
