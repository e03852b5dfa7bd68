use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, spanned::Spanned, FnArg, GenericArgument, Ident, ItemFn, Pat,
    PathArguments, Signature, Type,
};

/// Environment variable naming the MongoDB deployment used by `#[polls_test(mongodb)]`.
const DB_URI_VAR: &str = "POLLS_TEST_DB_URI";

/// Which store the test runs against.
#[derive(Copy, Clone, PartialEq, Eq)]
enum Backend {
    /// In-memory store seeded with the example fixtures.
    Seeded,
    /// Empty in-memory store.
    Empty,
    /// MongoDB store on a fresh, randomly-named database.
    MongoDb,
}

/// Transform an asynchronous test into a synchronous one and inject dependencies.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`] and
/// `crate::model::store::Store`, both backed by the same store. With
/// `#[polls_test(mongodb)]`, [`mongodb::Database`] and
/// `crate::model::mongodb::Coll<T>` may also be injected; the database is
/// dropped regardless of how the test terminates, and the test is skipped
/// when `POLLS_TEST_DB_URI` is unset.
///
/// By default the store is seeded with `crate::model::fixtures::example()`;
/// `#[polls_test(empty)]` starts from an empty store instead.
#[proc_macro_attribute]
pub fn polls_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    let backend = match parse_macro_input!(args as Option<Ident>) {
        None => Backend::Seeded,
        Some(arg) if arg == "empty" => Backend::Empty,
        Some(arg) if arg == "mongodb" => Backend::MongoDb,
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected `empty` or `mongodb`")
                .into_compile_error()
                .into();
        }
    };

    // Extract type information and reject invalid function signatures.
    let test_args = match check_sig(&item_fn.sig, backend) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    let body = match backend {
        Backend::Seeded | Backend::Empty => memory_test(backend, &new_name, &test_args),
        Backend::MongoDb => mongodb_test(&name, &new_name, &test_args),
    };

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// The test itself.
            #item_fn

            log4rs_test_utils::test_logging::init_logging_once_for(["polls"], None, None);

            #body
        }
    }
    .into()
}

/// A test against a fresh in-memory store. There is nothing to clean up.
fn memory_test(backend: Backend, test_fn: &Ident, test_args: &[TokenStream2]) -> TokenStream2 {
    let maybe_seed = (backend == Backend::Seeded).then(|| {
        quote! {
            crate::model::fixtures::seed(store.as_ref(), crate::model::fixtures::example())
                .await
                .unwrap();
        }
    });

    quote! {
        let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
            .thread_name("rocket-worker-test-thread")
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let store: crate::model::store::Store =
                std::sync::Arc::new(crate::model::store::MemoryStore::new());
            #maybe_seed
            #[allow(unused_variables)]
            let rocket_client = rocket::local::asynchronous::Client::tracked(
                crate::rocket_for_store(store.clone()),
            )
            .await
            .unwrap();

            #test_fn(#(#test_args),*).await;
        });
    }
}

/// A test against a randomly-named MongoDB database, which is dropped
/// afterwards even if the test panics.
fn mongodb_test(name: &Ident, test_fn: &Ident, test_args: &[TokenStream2]) -> TokenStream2 {
    quote! {
        let db_uri = match std::env::var(#DB_URI_VAR) {
            Ok(db_uri) => db_uri,
            Err(_) => {
                eprintln!("skipping {}: {} is not set", stringify!(#name), #DB_URI_VAR);
                return;
            }
        };

        /// Test setup.
        async fn setup(
            db_uri: String,
        ) -> (
            rocket::local::asynchronous::Client,
            ::mongodb::Database,
            crate::model::store::Store,
        ) {
            let db_client = ::mongodb::Client::with_uri_str(&db_uri).await.unwrap();
            let db = db_client.database(&format!("test{}", ::rand::random::<u32>()));
            let store: crate::model::store::Store = std::sync::Arc::new(
                crate::model::mongodb::MongoStore::prepare(&db).await.unwrap(),
            );
            let rocket_client = rocket::local::asynchronous::Client::tracked(
                crate::rocket_for_store(store.clone()),
            )
            .await
            .unwrap();

            (rocket_client, db, store)
        }

        /// Test cleanup.
        async fn cleanup(db: ::mongodb::Database) {
            db.drop(None).await.unwrap();
        }

        // Create an async runtime. We need a separate one for inside and
        // outside the `catch_unwind`.
        let outer_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
            .thread_name("test-setup-cleanup")
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let inner_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
            .thread_name("rocket-worker-test-thread")
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        // Run the setup.
        let (rocket_client, db, store) = outer_runtime.block_on(setup(db_uri));

        // Run the test, catching any panics.
        // Use mutexes to safely transfer `!UnwindSafe` data.
        let client_mutex = std::sync::Mutex::new(rocket_client);
        let db_mutex = std::sync::Mutex::new(db.clone());
        let store_mutex = std::sync::Mutex::new(store);
        let runtime_mutex = std::sync::Mutex::new(inner_runtime);
        let result = std::panic::catch_unwind(|| {
            #[allow(unused_variables)]
            let rocket_client = client_mutex.into_inner().unwrap();
            #[allow(unused_variables)]
            let db = db_mutex.into_inner().unwrap();
            #[allow(unused_variables)]
            let store = store_mutex.into_inner().unwrap();
            let runtime = runtime_mutex.into_inner().unwrap();

            runtime.block_on(#test_fn(#(#test_args),*));
        });

        // Run the cleanup.
        outer_runtime.block_on(cleanup(db));

        // If the test panicked, re-raise the panic.
        if let Err(cause) = result {
            std::panic::resume_unwind(cause);
        }
    }
}

/// Ensure the wrapped test is async, work out what to inject for each
/// parameter in order, and reject unknown parameters.
fn check_sig(sig: &Signature, backend: Backend) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut has_client = false;
    let mut has_db = false;
    let mut args = vec![];

    for input in &sig.inputs {
        let type_path = match input {
            FnArg::Typed(pat_type) if matches!(&*pat_type.pat, Pat::Ident(_)) => {
                match &*pat_type.ty {
                    Type::Path(type_path) => type_path,
                    _ => return Err(unexpected(input)),
                }
            }
            _ => return Err(unexpected(input)),
        };

        if let Some(type_ident) = type_path.path.get_ident() {
            if type_ident == "Client" {
                if has_client {
                    return Err(syn::Error::new(
                        input.span(),
                        "Test cannot accept more than one `rocket::local::asynchronous::Client`",
                    ));
                }
                has_client = true;
                args.push(quote! { rocket_client });
                continue;
            } else if type_ident == "Store" {
                args.push(quote! { store.clone() });
                continue;
            } else if type_ident == "Database" {
                if backend != Backend::MongoDb {
                    return Err(syn::Error::new(
                        input.span(),
                        "Only `#[polls_test(mongodb)]` can accept a `mongodb::Database`",
                    ));
                }
                if has_db {
                    return Err(syn::Error::new(
                        input.span(),
                        "Test cannot accept more than one `mongodb::Database`",
                    ));
                }
                has_db = true;
                args.push(quote! { db.clone() });
                continue;
            }
        } else if let Some(segment) = type_path.path.segments.last() {
            // Valid as the last path segment for any type is itself
            if segment.ident == "Coll" {
                if backend != Backend::MongoDb {
                    return Err(syn::Error::new(
                        input.span(),
                        "Only `#[polls_test(mongodb)]` can accept a `Coll<T>`",
                    ));
                }
                if let PathArguments::AngleBracketed(generics) = &segment.arguments {
                    if let Some(GenericArgument::Type(Type::Path(collection))) =
                        generics.args.first()
                    {
                        if let Some(collection) = collection.path.get_ident() {
                            args.push(quote! {
                                crate::model::mongodb::Coll::<#collection>::from_db(&db)
                            });
                            continue;
                        }
                    }
                }
            }
        }

        return Err(unexpected(input));
    }

    Ok(args)
}

fn unexpected(input: &FnArg) -> syn::Error {
    syn::Error::new(
        input.span(),
        "Expected one of `client_ident: Client`, `store_ident: Store`, \
         `db_ident: Database` or `collection_ident: Coll<T>`",
    )
}
