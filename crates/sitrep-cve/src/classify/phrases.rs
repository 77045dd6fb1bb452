//! Normative phrase lists for the impact classifier.
//!
//! The wording, membership, and grouping of these lists is pinned by the
//! classification tests; do not edit without updating them.

/// Phrases that alone assert arbitrary code execution as root/system.
pub const ROOT_EXECUTION_PHRASES: &[&str] = &[
    "execute arbitrary code as root",
    "execute arbitrary code with root privileges",
    "execute arbitrary code as the root user",
    "execute arbitrary code as a root user",
    "execute arbitrary code as LocalSystem",
    "execute arbitrary code as SYSTEM",
    "execute arbitrary code as Local System",
    "execute arbitrary code with SYSTEM privileges",
    "execute arbitrary code with LocalSystem privileges",
    "execute dangerous commands as root",
    "execute shell commands as the root user",
    "execute arbitrary commands as root",
    "execute arbitrary commands with root privileges",
    "execute arbitrary commands with root-level privileges",
    "execute commands as root",
    "execute root commands",
    "execute arbitrary os commands as root",
    "execute arbitrary shell commands as root",
    "execute arbitrary commands as SYSTEM",
    "execute arbitrary commands with SYSTEM privileges",
    "run commands as root",
    "run arbitrary commands as root",
    "run arbitrary commands as the root user",
    "execute code with root privileges",
    "load malicious firmware",
    "succeed in uploading malicious Firmware",
    "executed under the SYSTEM account",
];

/// Phrases that alone assert arbitrary code execution as a user.
pub const USER_EXECUTION_PHRASES: &[&str] = &[
    "include and execute arbitrary local php files",
    "execute arbitrary code",
    "command injection",
    "execute files",
    "run arbitrary code",
    "execute a malicious file",
    "execution of arbitrary code",
    "remote execution of arbitrary php code",
    "execute code",
    "code injection vulnerability",
    "execute any code",
    "malicious file could be then executed on the affected system",
    "inject arbitrary commands",
    "execute arbitrary files",
    "inject arbitrary sql code",
    "run the setuid executable",
    "vbscript injection",
    "execute administrative operations",
    "performs arbitrary actions",
    "submit arbitrary requests to an affected device",
    "perform arbitrary actions on an affected device",
    "executes an arbitrary program",
    "attacker can upload a malicious payload",
    "execute malicious code",
    "modify sql commands to the portal server",
    "execute arbitrary os commands",
    "execute arbitrary code with administrator privileges",
    "execute administrator commands",
    "executed with administrator privileges",
    "remote procedure calls on the affected system",
    "run a specially crafted application on a targeted system",
    "execute arbitrary code in a privileged context",
    "execute arbitrary code with super-user privileges",
    "run processes in an elevated context",
];

/// Verbs and nouns that in combination indicate code execution.
pub const EXECUTION_VERBS: &[&str] = &[" execut", " run ", " inject"];
pub const EXECUTION_NOUNS: &[&str] = &[" code ", " command", "arbitrary script", " code."];

/// Phrases indicating some privilege gain (system or application level).
pub const PRIVILEGE_PHRASES: &[&str] = &[
    "root privilege",
    "obtain root access",
    "elevation of privilege vulnerability",
    "privilege escalation",
    "escalation of privilege",
    "escalate privileges",
    "default password",
    "arbitrary password change",
    "escalate",
    "assume the identity of another user",
    "password in configuration file",
    "hardcoded login credentials",
    "passwords are encoded in hexadecimal",
    "passwords are in cleartext",
    "cleartext password storage",
    "obtain admin privilege",
    "obtain administrator privilege",
    "gain administrative rights",
    "gain administrative access",
    "gain administrator access",
    "gain administrator level access",
    "gain administrator rights",
    "obtain the cleartext administrator password",
    "steal the administrator password",
    "obtain the administrator password",
    "obtain the administrator's password",
    "read the administrator password",
    "obtain administrator password",
    "read the administrator's password",
    "discover the administrator password",
    "discover cleartext administrator password",
    "read the admin password",
    "obtain the admin password",
    "receive the admin password",
    "obtain the administrative password",
    "retrieve the administrative password",
    "obtain administrative password",
    "read the administrative password",
    "read administrative password",
    "gain full administrative control",
    "obtain privileged host OS access",
    "log in to the device with elevated privileges",
    "higher level of privileges",
    "change the admin password",
    "default passwords",
    "backdoor admin account",
    "hardcoded username / password",
    "administrator privileges",
    "default system account",
    "automatically logs in as admin",
    "creation of fully privileged new users",
    "user is logged in without being prompted for a password",
    "different privileges then the original requester",
    "obtain control",
    "steal any active admin session",
    "reset the admin password",
    "assuming the identity of a privileged user",
    "log in to an affected system as the linux admin user",
    "escalate his or her privileges",
    "launch a process with escalated privileges",
    "to the system with the same level of privilege as the application",
    "obtain sensitive domain administrator password information",
    "does not properly mitigate brute-force attacks",
    "allows anyone to authenticate",
    "execute actions that they do not have access to",
    "compromise user accounts",
    "brute force account credentials",
    "user credentials in plain text",
    "actions they do not have access to",
    "execute a report they do not have access to",
    "hijack the authentication of administrators",
    "bypass the application-level authentication",
    "impersonate other users",
    "access user credentials",
    "access to password information",
    "gain administrator functionality",
    "allow plaintext credentials to be obtained",
    "escalate their privileges",
    "credentials in a browser's local storage without expiration",
    "allowing users to elevate their privileges",
    "using the authenticated user's privileges",
    "potential reuse of domain credentials",
    "administrative access to the application",
    "on behalf of the currently logged in user",
    "gain privileged access",
    "do not have any option to change their own passwords",
    "create a new admin user",
    "hijack the authentication",
    "gain login access",
    "reset the registered user's password",
    "default privileged account",
    "login with the hashed password",
    "skip authentication checks",
    "hard-coded passwords",
    "hardcoded username and password",
    "local-privilege-escalation",
    "elevation of privileges",
    "include sensitive information such as account passwords",
    "account takeover",
    "obtaining admin privileges",
    "arbitrary password reset",
    "missing brute force protection",
    "makes brute-force attacks easier",
    "numeric password with a small maximum character size",
    "improper authentication issue",
    "gain access to moderator/admin accounts",
    "create new administrator user accounts",
    "take over the entire application",
    "add an administrator account",
    "plain text password",
    "possibly escalating privileges",
    "hijack oauth sessions of other users",
    "allows guest os users to obtain xen privileges",
    "gain access via cookie reuse",
    "password exposure",
    "obtain credentials",
    "resumption of an unauthenticated session",
    "no authorization check when connecting to the device",
    "incorrect authorization check",
    "hijack the authentication of logged administrators",
    "unrestricted access",
    "perform a password reset for users",
    "obtaining administrative permissions",
    "discloses foreign server passwords",
    "password leak",
    "disclosure of the master password",
    "submit authenticated requests",
    "takeover",
    "perform actions with the privileges of an authenticated user",
    "bypass authentication without obtaining the actual password",
    "take over the administrative session",
    "reset the password of the admin user",
    "gain guest os privileges",
    "change the administrator account password",
    "plaintext storage of a password",
    "password is stored in clear text",
    "default administrative password",
    "default password of admin",
    "steal a user's credentials",
    "dictionary attacks",
    "perform operations on device with administrative privileges",
    "include user credentials",
];

/// Phrases explicitly naming root/system-level privilege gain.
pub const ROOT_PRIVILEGE_PHRASES: &[&str] = &[
    "with the privileges of the root user",
    "add root ssh key",
    "gain root privilege",
    "obtain root privilege",
    "leading to root privilege",
    "gains root privilege",
    "gain SYSTEM privilege",
    "obtain SYSTEM privilege",
    "gain LocalSystem privilege",
    "obtain LocalSystem privilege",
    "gain full privilege",
    "gain root access",
    "gain root rights",
    "gain root privileges",
    "gain system level access to a remote shell session",
    "gain administrator or system privileges",
    "leading to root privileges",
    "obtain the root password",
    "take complete control of the device",
    "take full control of the target system",
    "account could be granted root- or system-level privileges",
    "find the root credentials",
    "backdoor root account",
    "elevate the privileges to root",
    "leading to remote root",
    "take control of the affected device",
    "gain complete control",
    "gain full access to the affected system",
    "obtain full access",
    "gain complete control of the system",
    "SYSTEM",
    "elevate privileges to the root user",
    "obtain full control",
];

/// Phrases indicating a login with user-level credentials on a system.
pub const USER_PRIVILEGE_SYSTEM_PHRASES: &[&str] = &[
    "gain elevated privileges on the system",
    "with the knowledge of the default password may login to the system",
    "log in as an admin user of the affected device",
    "log in as an admin or oper user of the affected device",
    "log in to the affected device using default credentials",
    "log in to an affected system as the admin user",
    "log in to the device with the privileges of a limited user",
    "devices have a hardcoded-key vulnerability",
];

/// Sufficient conditions lifting a LOW/PARTIAL confidentiality impact.
pub const CONFIDENTIALITY_SUFFICIENT: &[&str] = &[
    "devices allow remote attackers to read arbitrary files",
    "compromise the systems confidentiality",
    "read any file on the camera's linux filesystem",
    "gain read-write access to system settings",
    "all system settings can be read",
    "leak information about any clients connected to it",
    "read sensitive files on the system",
    "access arbitrary files on an affected device",
    "access system files",
    "gain unauthorized read access to files on the host",
    "obtain sensitive system information",
    "obtain sensitive information from kernel memory",
    "obtain privileged file system access",
    "routers allow directory traversal sequences",
    "packets can contain fragments of system memory",
    "obtain kernel memory",
    "read kernel memory",
    "read system memory",
    "reading system memory",
    "read device memory",
    "read host memory",
    "access kernel memory",
    "access sensitive kernel memory",
    "access shared memory",
    "host arbitrary files",
    "enumerate user accounts",
    "compromise an affected system",
];

/// Sufficient conditions lifting a LOW/PARTIAL integrity impact.
pub const INTEGRITY_SUFFICIENT: &[&str] = &[
    "compromise the systems confidentiality or integrity",
    "gain read-write access to system settings",
    "all system settings can be read and changed",
    "create arbitrary directories on the affected system",
    "on ismartalarm cube devices, there is incorrect access control",
    "bypass url filters that have been configured for an affected device",
    "bypass configured filters on the device",
    "modification of system files",
    "obtain privileged file system access",
    "change configuration settings",
    "compromise the affected system",
    "overwrite arbitrary kernel memory",
    "modify kernel memory",
    "overwrite kernel memory",
    "modifying kernel memory",
    "overwriting kernel memory",
    "corrupt kernel memory",
    "corrupt user memory",
    "upload firmware changes",
    "configuration parameter changes",
    "obtain sensitive information from kernel memory",
    "change the device's settings",
    "configuration changes",
    "modification of system states",
    "host arbitrary files",
];

/// Description tokens that alone assert availability loss.
pub const AVAILABILITY_TOKENS: &[&str] = &[
    "device crash",
    "device reload",
    "system crash",
    "cpu consumption",
];

/// Sufficient conditions lifting a LOW/PARTIAL availability impact.
pub const AVAILABILITY_SUFFICIENT: &[&str] = &[
    "an extended denial of service condition for the device",
    "exhaust the memory resources of the machine",
    "denial of service (dos) condition on an affected device",
    "crash systemui",
    "denial of service (dos) condition on the affected appliance",
    "cause the device to hang or unexpectedly reload",
    "denial of service (use-after-free) via a crafted application",
    "cause an affected device to reload",
    "cause an affected system to stop",
];
