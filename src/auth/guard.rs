//! 路由守卫：每次导航时决定页面能否渲染

use crate::models::Role;
use crate::session::{SessionController, SessionSnapshot, SessionStatus};
use regex::Regex;
use tokio::sync::watch;

/// 导航守卫的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    /// 未登录；请求路径随登录尝试带到登录页
    RedirectToLogin { return_to: String },
    /// 已登录但角色不允许
    RedirectToHome,
    /// 会话仍在恢复：显示中性的加载状态
    Defer,
}

pub const LOGIN_PATH: &str = "/login";
pub const HOME_PATH: &str = "/";

/// 路由的访问范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    Roles(Vec<Role>),
}

#[derive(Debug, Clone)]
pub struct RouteSpec {
    pattern: String,
    matcher: Regex,
    access: Access,
}

impl RouteSpec {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn access(&self) -> &Access {
        &self.access
    }
}

/// 有序路由表，第一个匹配的模式生效
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteSpec>,
}

const MEMBER_EDITORS: [Role; 3] = [Role::SuperAdmin, Role::AdminStaff, Role::PastoralStaff];
const STAFF_ADMINS: [Role; 2] = [Role::SuperAdmin, Role::AdminStaff];

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加路由；`:name` 段恰好匹配一个路径段
    pub fn route(mut self, pattern: &str, access: Access) -> Self {
        let body = pattern
            .trim_end_matches('/')
            .split('/')
            .map(|segment| {
                if segment.starts_with(':') {
                    "[^/]+".to_string()
                } else {
                    regex::escape(segment)
                }
            })
            .collect::<Vec<_>>()
            .join("/");

        match Regex::new(&format!("^{}/?$", body)) {
            Ok(matcher) => self.routes.push(RouteSpec {
                pattern: pattern.to_string(),
                matcher,
                access,
            }),
            Err(e) => tracing::warn!(%pattern, error = %e, "Ignoring invalid route pattern"),
        }
        self
    }

    /// 仪表盘的路由表
    pub fn dashboard() -> Self {
        Self::new()
            .route(LOGIN_PATH, Access::Public)
            .route("/", Access::Authenticated)
            .route("/members", Access::Authenticated)
            .route("/members/new", Access::Roles(MEMBER_EDITORS.to_vec()))
            .route("/members/unconnected", Access::Authenticated)
            .route("/members/:id", Access::Authenticated)
            .route("/members/:id/edit", Access::Roles(MEMBER_EDITORS.to_vec()))
            .route("/members/:id/engagement", Access::Authenticated)
            .route("/analytics", Access::Roles(STAFF_ADMINS.to_vec()))
            .route("/profile", Access::Authenticated)
            .route("/search", Access::Authenticated)
            .route("/settings", Access::Authenticated)
    }

    /// 匹配路径，忽略查询串与片段
    pub fn find(&self, path: &str) -> Option<&RouteSpec> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        self.routes.iter().find(|route| route.matcher.is_match(path))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    table: RouteTable,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(RouteTable::dashboard())
    }
}

impl RouteGuard {
    pub fn new(table: RouteTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// 受保护目标的核心判定
    ///
    /// `required_roles` 为 `None` 时任何已登录角色都可访问
    pub fn decide(
        snapshot: &SessionSnapshot,
        required_roles: Option<&[Role]>,
        requested_path: &str,
    ) -> GuardDecision {
        match snapshot.status {
            SessionStatus::Restoring => GuardDecision::Defer,
            SessionStatus::Anonymous => GuardDecision::RedirectToLogin {
                return_to: requested_path.to_string(),
            },
            SessionStatus::Authenticated => match required_roles {
                None => GuardDecision::Render,
                Some(roles) if snapshot.has_role(roles) => GuardDecision::Render,
                Some(_) => GuardDecision::RedirectToHome,
            },
        }
    }

    /// 按路由表判定
    ///
    /// 未知路径对应仪表盘的 `*` 兜底路由：无论会话状态（包括 Restoring）都回到首页，
    /// 首页自身再经过守卫
    pub fn evaluate(&self, snapshot: &SessionSnapshot, path: &str) -> GuardDecision {
        let Some(route) = self.table.find(path) else {
            tracing::debug!(%path, "No route matched, falling back to home");
            return GuardDecision::RedirectToHome;
        };

        match route.access() {
            Access::Public => GuardDecision::Render,
            Access::Authenticated => Self::decide(snapshot, None, path),
            Access::Roles(roles) => Self::decide(snapshot, Some(roles.as_slice()), path),
        }
    }

    pub fn check(&self, controller: &SessionController, path: &str) -> GuardDecision {
        self.evaluate(&controller.snapshot(), path)
    }

    /// 等待恢复完成后再判定
    pub async fn settle(
        &self,
        updates: &mut watch::Receiver<SessionSnapshot>,
        path: &str,
    ) -> GuardDecision {
        let settled = updates
            .wait_for(|snapshot| !snapshot.is_restoring())
            .await
            .map(|snapshot| snapshot.clone())
            .ok();
        // 发送端已关闭：按最后发布的状态判定
        let snapshot = match settled {
            Some(snapshot) => snapshot,
            None => updates.borrow().clone(),
        };
        self.evaluate(&snapshot, path)
    }
}

/// 侧边栏条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavItem {
    pub name: &'static str,
    pub href: &'static str,
    /// 为空表示所有已登录角色
    pub roles: &'static [Role],
}

pub const NAVIGATION: [NavItem; 5] = [
    NavItem { name: "Dashboard", href: "/", roles: &[] },
    NavItem { name: "Members", href: "/members", roles: &[] },
    NavItem { name: "Unconnected", href: "/members/unconnected", roles: &[] },
    NavItem { name: "Analytics", href: "/analytics", roles: &STAFF_ADMINS },
    NavItem { name: "Settings", href: "/settings", roles: &[Role::SuperAdmin] },
];

/// 设置页的标签
pub const SETTINGS_TABS: [NavItem; 3] = [
    NavItem { name: "App Settings", href: "/settings#app", roles: &[] },
    NavItem { name: "Notifications", href: "/settings#notifications", roles: &[] },
    NavItem { name: "System Users", href: "/settings#users", roles: &[Role::SuperAdmin] },
];

fn visible(items: &[NavItem], snapshot: &SessionSnapshot) -> Vec<NavItem> {
    if !snapshot.is_authenticated() {
        return Vec::new();
    }
    items
        .iter()
        .filter(|item| item.roles.is_empty() || snapshot.has_role(item.roles))
        .copied()
        .collect()
}

/// 当前会话可见的侧边栏条目
pub fn navigation(snapshot: &SessionSnapshot) -> Vec<NavItem> {
    visible(&NAVIGATION, snapshot)
}

pub fn settings_tabs(snapshot: &SessionSnapshot) -> Vec<NavItem> {
    visible(&SETTINGS_TABS, snapshot)
}
