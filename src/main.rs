//! Shepherd 管理后台命令行入口
//! 登录、登出、令牌刷新与权限检查

use clap::{Parser, Subcommand};
use secrecy::Secret;
use shepherd_admin::{
    auth::{is_authorized, RouteGuard},
    config::{AppConfig, StoreBackend},
    error::AppError,
    models::auth::ProfileUpdate,
    services::{ApiClient, HttpAuthApi, UsersAdmin},
    session::{
        FileSessionStore, LoginOutcome, MemorySessionStore, SessionController, SessionStore,
    },
    telemetry,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "shepherd-admin", version, about = "Shepherd dashboard session tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 登录；服务端要求 MFA 时从标准输入读取验证码
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SHEPHERD_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        mfa_code: Option<String>,
        /// 登录后跳转的路径
        #[arg(long)]
        return_to: Option<String>,
    },
    Logout,
    /// 显示当前用户
    Whoami {
        /// 从服务端重新获取
        #[arg(long)]
        reload: bool,
    },
    /// 刷新访问令牌
    Refresh,
    /// 检查当前角色是否允许某个操作，例如 CREATE_MEMBER
    Can { action: String },
    /// 对路径执行路由守卫
    Route { path: String },
    /// 更新个人资料
    Profile {
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// 修改密码
    Password {
        #[arg(long, env = "SHEPHERD_CURRENT_PASSWORD", hide_env_values = true)]
        current: String,
        #[arg(long, env = "SHEPHERD_NEW_PASSWORD", hide_env_values = true)]
        new: String,
    },
    Mfa {
        #[command(subcommand)]
        action: MfaCommand,
    },
    /// 系统用户管理（仅 SUPER_ADMIN）
    Users {
        #[command(subcommand)]
        action: UsersCommand,
    },
}

#[derive(Subcommand)]
enum MfaCommand {
    Setup,
    Verify { code: String },
}

#[derive(Subcommand)]
enum UsersCommand {
    List,
    Show { id: String },
    Activate { id: String },
    Deactivate { id: String },
    ResetPassword { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 按优先级加载：.env.local > .env
    dotenv::from_filename(".env.local").ok();
    dotenv::dotenv().ok();

    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    telemetry::init_telemetry(&config);

    let store: Arc<dyn SessionStore> = match config.session.store {
        StoreBackend::File => Arc::new(FileSessionStore::new(config.session.store_path.clone())),
        StoreBackend::Memory => Arc::new(MemorySessionStore::new()),
    };
    let api = Arc::new(HttpAuthApi::from_config(&config.api)?);
    let controller = Arc::new(SessionController::new(api, store).with_security(&config.security));
    controller.restore().await;

    if let Err(e) = run(cli.command, &config, controller).await {
        tracing::debug!(code = e.code(), error = %e, "Command failed");
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
    Ok(())
}

async fn run(
    command: Commands,
    config: &AppConfig,
    controller: Arc<SessionController>,
) -> Result<(), AppError> {
    match command {
        Commands::Login {
            email,
            password,
            mfa_code,
            return_to,
        } => {
            controller.begin_login(return_to).await;
            let mut outcome = controller
                .login(&email, Secret::new(password), mfa_code.as_deref())
                .await?;
            if outcome == LoginOutcome::MfaRequired {
                eprint!("MFA code: ");
                let code = read_line().await?;
                outcome = controller.submit_mfa_code(&code).await?;
            }
            if let LoginOutcome::Success {
                identity,
                redirect_to,
            } = outcome
            {
                println!(
                    "Signed in as {} ({})",
                    identity.full_name(),
                    identity.role.label()
                );
                println!("Continue to {}", redirect_to);
            }
        }
        Commands::Logout => {
            controller.logout().await;
            println!("Signed out");
        }
        Commands::Whoami { reload } => {
            let identity = if reload {
                Some(controller.reload_identity().await?)
            } else {
                controller.identity()
            };
            match identity {
                Some(identity) => {
                    println!("{} <{}>", identity.full_name(), identity.email);
                    println!("Role: {}", identity.role.label());
                    println!("MFA: {}", if identity.mfa_enabled { "enabled" } else { "disabled" });
                }
                None => println!("Not signed in"),
            }
        }
        Commands::Refresh => {
            controller.refresh_token().await?;
            println!("Access token refreshed");
        }
        Commands::Can { action } => {
            let allowed = controller
                .snapshot()
                .role()
                .is_some_and(|role| is_authorized(role, &action));
            println!("{}", if allowed { "allowed" } else { "denied" });
        }
        Commands::Route { path } => {
            let decision = RouteGuard::default().check(&controller, &path);
            println!("{:?}", decision);
        }
        Commands::Profile {
            first_name,
            last_name,
            email,
        } => {
            let identity = controller
                .update_profile(ProfileUpdate {
                    first_name,
                    last_name,
                    email,
                })
                .await?;
            println!("Profile updated: {} <{}>", identity.full_name(), identity.email);
        }
        Commands::Password { current, new } => {
            controller
                .change_password(Secret::new(current), Secret::new(new))
                .await?;
            println!("Password changed successfully");
        }
        Commands::Mfa { action } => match action {
            MfaCommand::Setup => {
                let setup = controller.setup_mfa().await?;
                println!("Secret: {}", setup.secret);
                println!("QR code: {}", setup.qr_code);
            }
            MfaCommand::Verify { code } => {
                controller.verify_mfa(&code).await?;
                println!("MFA enabled");
            }
        },
        Commands::Users { action } => {
            let users = UsersAdmin::new(ApiClient::from_config(&config.api)?, controller)
                .with_password_policy((&config.security).into());
            match action {
                UsersCommand::List => {
                    for user in users.list().await? {
                        println!(
                            "{}\t{} {}\t{}\t{}\t{}",
                            user.id,
                            user.first_name,
                            user.last_name,
                            user.email,
                            user.role,
                            if user.is_active { "active" } else { "inactive" }
                        );
                    }
                }
                UsersCommand::Show { id } => {
                    let user = users.get(&id).await?;
                    println!("{} {} <{}>", user.first_name, user.last_name, user.email);
                    println!("Role: {}", user.role.label());
                    println!("Active: {}", user.is_active);
                }
                UsersCommand::Activate { id } => {
                    users.update_status(&id, true).await?;
                    println!("User {} activated", id);
                }
                UsersCommand::Deactivate { id } => {
                    users.update_status(&id, false).await?;
                    println!("User {} deactivated", id);
                }
                UsersCommand::ResetPassword { id } => {
                    users.reset_password(&id).await?;
                    println!("Password reset email sent");
                }
            }
        }
    }
    Ok(())
}

async fn read_line() -> Result<String, AppError> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(line.trim().to_string())
}
