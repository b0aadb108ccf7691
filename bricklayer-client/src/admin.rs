use crate::{
    api::{Page, Profile, Session, UserId, ADMIN_PAGE_SIZE},
    Db, Error,
};

async fn require_admin<D: Db + ?Sized>(db: &D, s: &Session) -> Result<Profile, Error> {
    let me = db.fetch_profile(s.user).await?;
    if me.is_blocked {
        return Err(Error::user_blocked());
    }
    if !me.is_admin {
        tracing::info!(user = ?s.user, "non-admin tried to access the admin panel");
        return Err(Error::permission_denied());
    }
    Ok(me)
}

/// One page of the admin user list, `page` counting from 0
pub async fn list_users<D: Db + ?Sized>(
    db: &D,
    s: &Session,
    page: usize,
) -> Result<Page<Profile>, Error> {
    require_admin(db, s).await?;
    db.list_profiles(s, page, ADMIN_PAGE_SIZE).await
}

/// Grants or revokes admin rights, returning the updated profile
pub async fn toggle_admin<D: Db + ?Sized>(
    db: &D,
    s: &Session,
    user: UserId,
) -> Result<Profile, Error> {
    require_admin(db, s).await?;
    if user == s.user {
        return Err(Error::self_modification());
    }
    let target = db.fetch_profile(user).await?;
    tracing::info!(admin = ?s.user, ?user, is_admin = !target.is_admin, "changing admin status");
    db.set_admin(s, user, !target.is_admin).await
}

/// Blocks or unblocks a user, returning the updated profile
pub async fn toggle_blocked<D: Db + ?Sized>(
    db: &D,
    s: &Session,
    user: UserId,
) -> Result<Profile, Error> {
    require_admin(db, s).await?;
    if user == s.user {
        return Err(Error::self_modification());
    }
    let target = db.fetch_profile(user).await?;
    tracing::info!(admin = ?s.user, ?user, is_blocked = !target.is_blocked, "changing block status");
    db.set_blocked(s, user, !target.is_blocked).await
}
